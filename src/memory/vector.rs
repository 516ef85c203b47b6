// Vector math — cosine similarity, embedding byte codec, recency decay.

/// Cosine similarity between two vectors. Returns 0.0–1.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return 0.0;
    }

    let raw = dot / denom;
    if !raw.is_finite() {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let sim = raw.clamp(0.0, 1.0) as f32;
    sim
}

/// Serialize f32 vector to bytes (little-endian)
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for &f in v {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

/// Deserialize bytes to f32 vector (little-endian)
pub fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// Exponential half-life recency curve.
///
/// Maps the age of a record (relative to the newest record in the same
/// candidate set, both RFC 3339) onto `[0, 1]`: zero age → 1.0, decaying by
/// half every `half_life_days`. Anchoring on the newest candidate rather than
/// wall clock keeps ranking deterministic for identical input sets.
/// Unparseable timestamps rank as fully decayed.
pub fn recency_value(created_at: &str, newest_created_at: &str, half_life_days: f64) -> f64 {
    let Some(created) = parse_rfc3339(created_at) else {
        return 0.0;
    };
    let Some(newest) = parse_rfc3339(newest_created_at) else {
        return 0.0;
    };

    let age_secs = (newest - created).num_seconds();
    if age_secs <= 0 {
        return 1.0;
    }

    let half_life = if half_life_days > 0.0 { half_life_days } else { 7.0 };
    #[allow(clippy::cast_precision_loss)]
    let age_days = age_secs as f64 / 86_400.0;
    0.5_f64.powf(age_days / half_life).clamp(0.0, 1.0)
}

fn parse_rfc3339(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&chrono::Utc))
}
