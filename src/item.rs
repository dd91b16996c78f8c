use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_PREFIX: &str = "story";
const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A single story. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    /// Older stores wrote the payload under `imageData`.
    #[serde(alias = "imageData")]
    pub payload: String,
    pub created_at: u64,
    pub expires_at: u64,
}

impl ContentItem {
    pub fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// `story_<millis>_<random base-36 suffix>`
pub fn generate_id<R: Rng + ?Sized>(created_at: u64, rng: &mut R) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{ID_PREFIX}_{created_at}_{suffix}")
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{generate_id, ContentItem};

    #[test]
    fn id_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = generate_id(1_700_000_000_000, &mut rng);
        let parts = id.split('_').collect::<Vec<&str>>();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "story");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn ids_differ_within_one_millisecond() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = generate_id(5, &mut rng);
        let b = generate_id(5, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn wire_format() {
        let item = ContentItem {
            id: "story_1_abc".into(),
            payload: "data:image/png;base64,AAAA".into(),
            created_at: 1,
            expires_at: 86_400_001,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(
            json,
            r#"{"id":"story_1_abc","payload":"data:image/png;base64,AAAA","createdAt":1,"expiresAt":86400001}"#
        );
    }

    #[test]
    fn accepts_legacy_image_data_field() {
        let item: ContentItem = serde_json::from_str(
            r#"{"id":"story_1_x","imageData":"data:image/jpeg;base64,/9j/","createdAt":1,"expiresAt":2}"#,
        )
        .unwrap();
        assert_eq!(item.payload, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn liveness_boundary() {
        let item = ContentItem {
            id: "story_0_a".into(),
            payload: String::new(),
            created_at: 0,
            expires_at: 100,
        };
        assert!(item.is_live(99));
        assert!(!item.is_live(100));
    }
}
