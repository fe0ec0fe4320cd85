//! Decoding of the receiver-reported resume token.
//!
//! The real storage layer's token format is out of scope; this module
//! defines a small self-describing text format (`from=<guid>;to=<guid>;
//! to_name=<name>`, `from=` optional) that the in-memory fakes in
//! `replication-test-support` produce and that this decoder parses. A
//! production deployment replaces this module's parsing with the real
//! storage layer's format without touching call sites: callers only ever
//! see [`ResumeToken`].

use replication_endpoint::Guid;

use crate::error::ReplicationError;

/// A decoded resume token: the receiver holds a partially received `to`
/// dataset whose storage layer will refuse any send that does not match
/// these GUIDs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResumeToken {
    from_guid: Option<Guid>,
    to_guid: Guid,
    to_name: String,
}

impl ResumeToken {
    /// Returns the base version's GUID, absent if this token describes an
    /// initial (full) receive.
    #[must_use]
    pub const fn from_guid(&self) -> Option<Guid> {
        self.from_guid
    }

    /// Returns the partially received target version's GUID.
    #[must_use]
    pub const fn to_guid(&self) -> Guid {
        self.to_guid
    }

    /// Returns the target version's short name, for diagnostics.
    #[must_use]
    pub fn to_name(&self) -> &str {
        &self.to_name
    }
}

/// Decodes a raw resume token string reported by a receiver.
///
/// # Errors
///
/// Returns [`ReplicationError::ResumeTokenMalformed`] if `raw` cannot be
/// parsed, is missing a required `to` field, or has an equal `from`/`to`
/// GUID (never a valid increment). A token missing `to` is always malformed;
/// there is no such thing as a token without a target.
pub fn decode(path: &str, raw: &str) -> Result<ResumeToken, ReplicationError> {
    let malformed = |reason: &str| ReplicationError::ResumeTokenMalformed {
        path: path.to_string(),
        raw: raw.to_string(),
        reason: reason.to_string(),
    };

    let mut from_guid = None;
    let mut to_guid = None;
    let mut to_name = None;

    for field in raw.split(';').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = field.split_once('=').ok_or_else(|| malformed("field is missing '='"))?;
        match key {
            "from" => from_guid = Some(parse_guid(value).ok_or_else(|| malformed("'from' is not a valid guid"))?),
            "to" => to_guid = Some(parse_guid(value).ok_or_else(|| malformed("'to' is not a valid guid"))?),
            "to_name" => to_name = Some(value.to_string()),
            other => return Err(malformed(&format!("unknown field '{other}'"))),
        }
    }

    let to_guid = to_guid.ok_or_else(|| malformed("missing required 'to' field"))?;
    let to_name = to_name.ok_or_else(|| malformed("missing required 'to_name' field"))?;

    if from_guid == Some(to_guid) {
        return Err(malformed("'from' and 'to' guids are equal"));
    }

    Ok(ResumeToken {
        from_guid,
        to_guid,
        to_name,
    })
}

fn parse_guid(value: &str) -> Option<Guid> {
    let raw = value.strip_prefix("0x").map_or_else(
        || value.parse::<u64>().ok(),
        |hex| u64::from_str_radix(hex, 16).ok(),
    );
    raw.map(Guid::new)
}

/// Encodes a resume token in this crate's wire format, for use by test
/// fakes and by round-trip tests.
#[must_use]
pub fn encode(from_guid: Option<Guid>, to_guid: Guid, to_name: &str) -> String {
    match from_guid {
        Some(from) => format!("from={};to={};to_name={}", from.get(), to_guid.get(), to_name),
        None => format!("to={};to_name={}", to_guid.get(), to_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_decode() {
        let raw = encode(Some(Guid::new(1)), Guid::new(2), "b");
        let token = decode("tank/data", &raw).unwrap();
        assert_eq!(token.from_guid(), Some(Guid::new(1)));
        assert_eq!(token.to_guid(), Guid::new(2));
        assert_eq!(token.to_name(), "b");
    }

    #[test]
    fn from_guid_is_optional_for_initial_receives() {
        let raw = encode(None, Guid::new(2), "b");
        let token = decode("tank/data", &raw).unwrap();
        assert_eq!(token.from_guid(), None);
    }

    #[test]
    fn missing_to_guid_is_malformed() {
        let err = decode("tank/data", "from=1;to_name=b").unwrap_err();
        assert!(matches!(err, ReplicationError::ResumeTokenMalformed { .. }));
    }

    #[test]
    fn equal_from_and_to_guid_is_malformed() {
        let raw = encode(Some(Guid::new(5)), Guid::new(5), "b");
        let err = decode("tank/data", &raw).unwrap_err();
        assert!(matches!(err, ReplicationError::ResumeTokenMalformed { .. }));
    }

    #[test]
    fn unknown_field_is_malformed() {
        let err = decode("tank/data", "bogus=1;to=2;to_name=b").unwrap_err();
        assert!(matches!(err, ReplicationError::ResumeTokenMalformed { .. }));
    }

    #[test]
    fn hex_guids_are_accepted() {
        let token = decode("tank/data", "to=0xdeadbeef;to_name=b").unwrap();
        assert_eq!(token.to_guid(), Guid::new(0xdead_beef));
    }
}
