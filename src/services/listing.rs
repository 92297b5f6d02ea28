use std::fmt::Write;

use crate::models::UserJob;

/// At most this many comparables are shown in a summary.
const MAX_COMPS_SHOWN: usize = 10;

/// Render a job as the plain-text listing summary shown to the user.
///
/// Detected attributes the backend did not report are left out entirely.
pub fn render_summary(job: &UserJob) -> String {
    let mut out = String::new();
    let detected = &job.detected;

    out.push_str("Detected Attributes\n");
    let attributes = [
        ("Category", &detected.category),
        ("Brand", &detected.brand),
        ("Model", &detected.model),
        ("Color", &detected.color),
        ("Size", &detected.size),
        ("Condition", &detected.condition),
    ];
    for (label, value) in attributes {
        if let Some(value) = value {
            let _ = writeln!(out, "{}: {}", label, value);
        }
    }
    if let Some(features) = detected.notable_features.as_ref().filter(|f| !f.is_empty()) {
        out.push_str("Features:\n");
        for feature in features {
            let _ = writeln!(out, "• {}", feature);
        }
    }
    if let Some(defects) = detected.defects.as_ref().filter(|d| !d.is_empty()) {
        out.push_str("Defects:\n");
        for defect in defects {
            let _ = writeln!(out, "• {}", defect);
        }
    }

    let price = &job.suggested_price;
    out.push_str("\nSuggested Price Range\n");
    let _ = writeln!(
        out,
        "${:.2} – ${:.2} (mid: ${:.2})",
        price.low, price.high, price.mid
    );
    let _ = writeln!(out, "Confidence: {:.0}%", price.confidence * 100.0);

    out.push_str("\nGenerated Copy\n");
    let _ = writeln!(out, "{}", job.copy.title);
    for bullet in &job.copy.bullets {
        let _ = writeln!(out, "• {}", bullet);
    }

    if !job.comps.is_empty() {
        out.push_str("\nComparables\n");
        for comp in job.comps.iter().take(MAX_COMPS_SHOWN) {
            let _ = writeln!(out, "{} (${:.2})", comp.title, comp.price);
        }
    }

    out
}
