use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{ImageUpload, UserJob};
use crate::services::analysis::{AnalysisClient, AnalysisError};

/// Result shared by every caller attached to one request.
pub type SharedOutcome = Result<UserJob, Arc<AnalysisError>>;

type SharedRequest = Shared<BoxFuture<'static, SharedOutcome>>;

/// Identity of a request for deduplication: same image bytes, same notes,
/// same user. Empty notes and absent notes are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    image_sha256: String,
    notes: Option<String>,
    user_id: String,
}

impl RequestKey {
    pub fn new(image: &ImageUpload, notes: Option<&str>, user_id: &str) -> Self {
        Self {
            image_sha256: hex::encode(Sha256::digest(&image.bytes)),
            notes: notes.filter(|n| !n.is_empty()).map(str::to_string),
            user_id: user_id.to_string(),
        }
    }

    pub fn image_sha256(&self) -> &str {
        &self.image_sha256
    }
}

/// Wraps an [`AnalysisClient`] so that at most one request per [`RequestKey`]
/// is in flight. Callers arriving while it runs await the same result.
///
/// This is not a cache: once a request finishes its key is released, and the
/// next identical call goes to the backend again. When every caller waiting on
/// a request has gone away, the request is dropped and its connection closed.
pub struct CoalescingClient {
    client: Arc<AnalysisClient>,
    in_flight: Mutex<HashMap<RequestKey, InFlight>>,
    next_id: AtomicU64,
}

struct InFlight {
    id: u64,
    request: SharedRequest,
}

impl CoalescingClient {
    pub fn new(client: Arc<AnalysisClient>) -> Self {
        Self {
            client,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<RequestKey, InFlight>> {
        lock(&self.in_flight)
    }

    /// Number of distinct requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    pub async fn analyze(
        &self,
        image: &ImageUpload,
        notes: Option<&str>,
        user_id: &str,
    ) -> SharedOutcome {
        let key = RequestKey::new(image, notes, user_id);

        let mut waiter = {
            let mut in_flight = self.in_flight();
            let entry = match in_flight.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    debug!(image_sha256 = %key.image_sha256, "Joining in-flight analysis");
                    existing.into_mut()
                }
                Entry::Vacant(slot) => {
                    let client = Arc::clone(&self.client);
                    let image = image.clone();
                    let notes = key.notes.clone();
                    let user_id = key.user_id.clone();
                    let request = async move {
                        client
                            .analyze(&image, notes.as_deref(), &user_id)
                            .await
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    slot.insert(InFlight {
                        id: self.next_id.fetch_add(1, Ordering::Relaxed),
                        request,
                    })
                }
            };

            Waiter {
                in_flight: &self.in_flight,
                id: entry.id,
                request: entry.request.clone(),
                key,
            }
        };

        (&mut waiter.request).await
    }
}

/// One caller's interest in an in-flight request. Dropping it, whether the
/// request finished or the caller gave up, releases the key when nobody else
/// is waiting.
struct Waiter<'a> {
    in_flight: &'a Mutex<HashMap<RequestKey, InFlight>>,
    key: RequestKey,
    id: u64,
    request: SharedRequest,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock(self.in_flight);
        let release = in_flight.get(&self.key).is_some_and(|entry| {
            // A newer request may already occupy the key; only release our own.
            // While pending, the map and this waiter hold two of the handles.
            entry.id == self.id
                && (entry.request.peek().is_some() || entry.request.strong_count() == Some(2))
        });
        let released = if release {
            in_flight.remove(&self.key)
        } else {
            None
        };
        drop(in_flight);

        if let Some(entry) = released {
            if entry.request.peek().is_none() {
                debug!(image_sha256 = %self.key.image_sha256, "Dropping abandoned analysis");
            }
        }
    }
}

fn lock(
    in_flight: &Mutex<HashMap<RequestKey, InFlight>>,
) -> MutexGuard<'_, HashMap<RequestKey, InFlight>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}
