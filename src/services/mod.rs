pub mod analysis;
pub mod coalesce;
pub mod image_prep;
pub mod listing;
pub mod task;
