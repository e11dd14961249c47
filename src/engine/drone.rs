use rand::Rng;

const DRONE_ID_PREFIX: &str = "DRONE-";
const DRONE_ID_LEN: usize = 6;
const DRONE_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Collisions are possible and not deduplicated.
pub fn generate_drone_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..DRONE_ID_LEN)
        .map(|_| DRONE_ID_CHARSET[rng.gen_range(0..DRONE_ID_CHARSET.len())] as char)
        .collect();

    format!("{DRONE_ID_PREFIX}{suffix}")
}

pub fn is_drone_id(candidate: &str) -> bool {
    candidate
        .strip_prefix(DRONE_ID_PREFIX)
        .is_some_and(|suffix| {
            suffix.len() == DRONE_ID_LEN
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}
