//! Reference payloads and generated images

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

use swiftora::ImageUpload;

/// The backend response used by the reference client tests.
pub const REFERENCE_JOB: &str = r#"{"id":"123","userId":"user@example.com","imageUrl":"path/to/image.jpg","notes":"Some notes","detected":{"category":"smartphone","brand":"Apple","model":"iPhone 12","color":"blue","size":"medium","condition":"good","notable_features":["Feature A","Feature B"],"defects":[]},"comps":[],"suggestedPrice":{"low":100.0,"mid":150.0,"high":200.0,"confidence":0.8},"copy":{"title":"Apple iPhone 12","bullets":["Bullet 1","Bullet 2"]},"createdAt":"2025-09-02T00:00:00Z"}"#;

pub fn reference_job() -> Value {
    serde_json::from_str(REFERENCE_JOB).unwrap()
}

/// The reference job with one top-level field removed.
pub fn reference_job_without(field: &str) -> String {
    let mut value = reference_job();
    value.as_object_mut().unwrap().remove(field);
    value.to_string()
}

/// A job shaped like the demo backend's output, with comps attached.
pub fn job_with_comps() -> String {
    let mut value = reference_job();
    value["comps"] = Value::Array(seed_comps());
    value["detected"]["defects"] = json!(["Scratch on back"]);
    value["notes"] = Value::Null;
    value.to_string()
}

pub fn seed_comps() -> Vec<Value> {
    vec![
        json!({
            "source": "seed",
            "url": "#",
            "price": 500.0,
            "currency": "USD",
            "title": "Apple iPhone 12 128GB Blue",
            "condition": "good"
        }),
        json!({
            "source": "seed",
            "url": "#",
            "price": 700.0,
            "currency": "USD",
            "title": "Samsung Galaxy S21 256GB",
            "shipping": 9.99
        }),
        json!({
            "source": "seed",
            "url": "#",
            "price": 450.0,
            "currency": "USD",
            "title": "Apple iPhone 11 64GB",
            "image": "https://example.com/iphone11.jpg"
        }),
    ]
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn png_upload() -> ImageUpload {
    ImageUpload::new(png_bytes(48, 32), "image/png")
}
