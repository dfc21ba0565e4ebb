use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SharePermissions {
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub download: bool,
}

impl SharePermissions {
    pub fn owner() -> Self {
        Self {
            view: true,
            edit: true,
            download: true,
        }
    }

    /// Anyone an entry is shared with can see it, and editors can always
    /// download what they edit.
    pub fn normalized(self) -> Self {
        Self {
            view: true,
            edit: self.edit,
            download: self.download || self.edit,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"view":true}"#.to_string())
    }

    /// Malformed stored permissions degrade to view-only.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str::<Self>(raw)
            .map(Self::normalized)
            .unwrap_or(Self {
                view: true,
                edit: false,
                download: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_is_always_granted() {
        let p = SharePermissions::default().normalized();
        assert!(p.view);
        assert!(!p.edit);
        assert!(!p.download);
    }

    #[test]
    fn test_edit_implies_download() {
        let p = SharePermissions {
            view: false,
            edit: true,
            download: false,
        }
        .normalized();
        assert!(p.download);
    }

    #[test]
    fn test_json_round_trip_and_fallback() {
        let p = SharePermissions::owner();
        assert_eq!(SharePermissions::from_json(&p.to_json()), p);
        assert_eq!(
            SharePermissions::from_json("garbage"),
            SharePermissions::default().normalized()
        );
    }
}
