//! Last-write-wins conflict resolution.
//!
//! The whole record is compared by `updated_at_ms` only. A remote record
//! wins iff it is strictly newer; equal timestamps carry no newer
//! information, so the local record is kept.

use prefsync_types::PreferenceRecord;

/// Which side a resolution picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The local store value is kept.
    Local,
    /// The remote record replaces the local store value.
    Remote,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The side that won.
    pub winner: Winner,
    /// The winning record, unchanged.
    pub record: PreferenceRecord,
}

impl Resolution {
    /// True if the remote record won.
    pub fn remote_won(&self) -> bool {
        self.winner == Winner::Remote
    }
}

/// Pick between the local record and an optional remote record.
///
/// An absent remote record behaves like one with a timestamp of negative
/// infinity.
pub fn resolve(local: &PreferenceRecord, remote: Option<&PreferenceRecord>) -> Resolution {
    match remote {
        Some(remote) if remote.updated_at_ms > local.updated_at_ms => Resolution {
            winner: Winner::Remote,
            record: remote.clone(),
        },
        _ => Resolution {
            winner: Winner::Local,
            record: local.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(language: &str, updated_at_ms: i64) -> PreferenceRecord {
        PreferenceRecord::new(language, "USD", "imperial", "utc", updated_at_ms)
    }

    #[test]
    fn newer_remote_wins() {
        let resolution = resolve(&at("ru", 100), Some(&at("en", 200)));
        assert_eq!(resolution.winner, Winner::Remote);
        assert_eq!(resolution.record, at("en", 200));
        assert!(resolution.remote_won());
    }

    #[test]
    fn newer_local_wins() {
        let resolution = resolve(&at("ru", 500), Some(&at("en", 300)));
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record, at("ru", 500));
    }

    #[test]
    fn tie_keeps_local_even_with_different_content() {
        let resolution = resolve(&at("ru", 100), Some(&at("en", 100)));
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record.language, "ru");
    }

    #[test]
    fn absent_remote_keeps_local() {
        let local = PreferenceRecord::default();
        let resolution = resolve(&local, None);
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record, local);
    }

    #[test]
    fn any_written_remote_beats_unwritten_local() {
        let resolution = resolve(&PreferenceRecord::default(), Some(&at("en", 1)));
        assert_eq!(resolution.winner, Winner::Remote);
    }

    #[test]
    fn only_timestamp_decides() {
        let timestamps = [i64::MIN, -1, 0, 1, 100, 101, i64::MAX];
        for &l in &timestamps {
            for &r in &timestamps {
                let local = at("ru", l);
                let remote = PreferenceRecord::new("en", "AED", "metric", "gmt", r);
                let resolution = resolve(&local, Some(&remote));
                if r > l {
                    assert_eq!(resolution.winner, Winner::Remote, "l={} r={}", l, r);
                    assert_eq!(resolution.record, remote);
                } else {
                    assert_eq!(resolution.winner, Winner::Local, "l={} r={}", l, r);
                    assert_eq!(resolution.record, local);
                }
            }
        }
    }
}
