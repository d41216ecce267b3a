//! Opaque record identifiers and short display serials.

use rand::Rng;

/// Generates an opaque, globally unique record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generates a short printable serial for display (e.g. task `TASK-7F3A`).
/// Not guaranteed unique on its own; callers retry on collision.
pub fn new_serial(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..4)
        .map(|_| {
            let n: u8 = rng.random_range(0..36);
            std::char::from_digit(n as u32, 36).unwrap_or('0').to_ascii_uppercase()
        })
        .collect();
    format!("{prefix}-{suffix}")
}

/// Generates the random filename suffix used to keep filenames unique under
/// concurrent creation bursts.
pub fn filename_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn serial_has_prefix_and_length() {
        let serial = new_serial("TASK");
        assert!(serial.starts_with("TASK-"));
        assert_eq!(serial.len(), "TASK-".len() + 4);
    }
}
