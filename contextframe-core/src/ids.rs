// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! UUID helpers for the record primary key.

use uuid::Uuid;

/// Generate a new random (RFC-4122 v4) record identifier.
pub fn new_record_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Parse a textual uuid, surfacing a validation-shaped error message on
/// failure rather than propagating `uuid::Error` directly.
pub fn parse_uuid(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("invalid uuid {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_v4_uuids() {
        let id = new_record_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn parses_valid_uuid() {
        let id = new_record_uuid();
        let parsed = parse_uuid(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_invalid_uuid() {
        assert!(parse_uuid("not-a-uuid").is_err());
    }
}
