//! Serde helpers for the wire representation of time fields.
//!
//! Start times serialize as RFC 3339 strings (chrono's default for
//! `DateTime<Utc>`); durations serialize as signed integer microseconds,
//! the resolution the fixture format and legacy clients use.

/// Serializes a [`chrono::TimeDelta`] as whole microseconds.
pub mod duration_us {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(d.num_microseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let micros = i64::deserialize(deserializer)?;
        Ok(TimeDelta::microseconds(micros))
    }
}

/// Same encoding for `Option<TimeDelta>` fields, omitted when `None`.
pub mod opt_duration_us {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<TimeDelta>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&d.num_microseconds().unwrap_or(i64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TimeDelta>, D::Error> {
        let micros = Option::<i64>::deserialize(deserializer)?;
        Ok(micros.map(TimeDelta::microseconds))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration_us")]
        d: TimeDelta,
    }

    #[test]
    fn duration_roundtrips_as_micros() {
        let json = serde_json::to_string(&Wrapper {
            d: TimeDelta::milliseconds(1500),
        })
        .unwrap();
        assert_eq!(json, r#"{"d":1500000}"#);
        let back: Wrapper = serde_json::from_str(r#"{"d":-7}"#).unwrap();
        assert_eq!(back.d, TimeDelta::microseconds(-7));
    }
}
