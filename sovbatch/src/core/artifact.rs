//! File naming for reports-directory artifacts.
//!
//! Every generated name embeds a [`Stamp`]; parsing a name back recovers it.
//! The two promotion aliases deliberately do not parse as artifacts.

use crate::core::stamp::Stamp;

pub const READY_LIST_NAME: &str = "BATCH_READY.txt";
pub const ARTIFACT_PREFIX: &str = "APPLIED_HARDENED_";
pub const ARTIFACT_EXT: &str = ".xlsm";
pub const AUDIT_EXT: &str = ".audit.jsonl";
pub const GOLD_NAME: &str = "APPLIED_HARDENED_GOLD.xlsm";
pub const LATEST_NAME: &str = "APPLIED_HARDENED_LATEST.xlsm";
pub const PROMOTION_RECORD_NAME: &str = "APPLIED_HARDENED_PROMOTION.json";
pub const RUN_LOG_PREFIX: &str = "BATCH_RUN_";
pub const RUN_LOG_EXT: &str = ".log";

pub fn artifact_file_name(stamp: &Stamp) -> String {
    format!("{ARTIFACT_PREFIX}{stamp}{ARTIFACT_EXT}")
}

pub fn audit_file_name(stamp: &Stamp) -> String {
    format!("{ARTIFACT_PREFIX}{stamp}{AUDIT_EXT}")
}

pub fn run_log_file_name(stamp: &Stamp) -> String {
    format!("{RUN_LOG_PREFIX}{stamp}{RUN_LOG_EXT}")
}

/// Recover the stamp from an applied-artifact file name.
///
/// Returns `None` for aliases, audit sidecars, and unrelated files.
pub fn parse_artifact_name(name: &str) -> Option<Stamp> {
    let rest = name.strip_prefix(ARTIFACT_PREFIX)?;
    let stamp = rest.strip_suffix(ARTIFACT_EXT)?;
    Stamp::parse(stamp)
}

/// Recover the stamp from a run-log file name.
pub fn parse_run_log_name(name: &str) -> Option<Stamp> {
    let rest = name.strip_prefix(RUN_LOG_PREFIX)?;
    let stamp = rest.strip_suffix(RUN_LOG_EXT)?;
    Stamp::parse(stamp)
}

/// An applied artifact discovered by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactName {
    pub stamp: Stamp,
    pub file_name: String,
}

/// Pick the newest artifact among file names.
///
/// Ordering is a full lexical compare of the file name, which equals stamp
/// order because every artifact shares the same prefix and extension.
pub fn newest_artifact<I, S>(names: I) -> Option<ArtifactName>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            parse_artifact_name(name).map(|stamp| ArtifactName {
                stamp,
                file_name: name.to_string(),
            })
        })
        .max_by(|a, b| a.file_name.cmp(&b.file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(raw: &str) -> Stamp {
        Stamp::parse(raw).expect("valid stamp")
    }

    #[test]
    fn names_round_trip_through_parse() {
        let s = stamp("20240101_000001_000000");
        assert_eq!(
            artifact_file_name(&s),
            "APPLIED_HARDENED_20240101_000001_000000.xlsm"
        );
        assert_eq!(
            audit_file_name(&s),
            "APPLIED_HARDENED_20240101_000001_000000.audit.jsonl"
        );
        assert_eq!(parse_artifact_name(&artifact_file_name(&s)), Some(s.clone()));
        assert_eq!(parse_run_log_name(&run_log_file_name(&s)), Some(s));
    }

    #[test]
    fn aliases_and_sidecars_are_not_artifacts() {
        assert_eq!(parse_artifact_name(GOLD_NAME), None);
        assert_eq!(parse_artifact_name(LATEST_NAME), None);
        assert_eq!(
            parse_artifact_name("APPLIED_HARDENED_20240101_000001_000000.audit.jsonl"),
            None
        );
        assert_eq!(parse_artifact_name("notes.xlsm"), None);
    }

    #[test]
    fn newest_wins_regardless_of_listing_order() {
        let names = [
            "APPLIED_HARDENED_20240101_000002_000000.xlsm",
            GOLD_NAME,
            "APPLIED_HARDENED_20240101_000001_000000.xlsm",
            LATEST_NAME,
            "BATCH_READY.txt",
        ];
        let newest = newest_artifact(names).expect("newest");
        assert_eq!(
            newest.file_name,
            "APPLIED_HARDENED_20240101_000002_000000.xlsm"
        );
    }

    #[test]
    fn newest_is_none_without_artifacts() {
        assert_eq!(newest_artifact([GOLD_NAME, "BATCH_READY.txt"]), None);
    }
}
