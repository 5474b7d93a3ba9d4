//! Result ledger: at most one stored result per check name

use tremor_common::crd::ChaosResult;

/// Insert `result` as the entry for `check`.
///
/// The first existing entry for the check is replaced in place so unrelated
/// entries keep their order; any later duplicates are dropped. Without an
/// existing entry the result is appended.
pub fn upsert_result(results: &mut Vec<ChaosResult>, result: ChaosResult, check: &str) {
    match results.iter().position(|r| r.is_check(check)) {
        Some(idx) => {
            results[idx] = result;
            let mut seen = 0usize;
            results.retain(|r| {
                if r.is_check(check) {
                    seen += 1;
                    seen == 1
                } else {
                    true
                }
            });
        }
        None => results.push(result),
    }
}

/// Whether a result for `check` has been recorded
pub fn has_result(results: &[ChaosResult], check: &str) -> bool {
    results.iter().any(|r| r.is_check(check))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(results: &[ChaosResult]) -> Vec<&str> {
        results.iter().map(|r| r.detail.message.as_str()).collect()
    }

    #[test]
    fn appends_new_check() {
        let mut results = vec![ChaosResult::new("Experimental", false, "job failed")];
        upsert_result(
            &mut results,
            ChaosResult::new("Verify", true, "job succeeded"),
            "Verify",
        );
        assert_eq!(
            messages(&results),
            ["Experimental: job failed", "Verify: job succeeded"]
        );
    }

    #[test]
    fn replaces_in_place_preserving_order() {
        let mut results = vec![
            ChaosResult::new("Experimental", false, "first"),
            ChaosResult::new("Verify", false, "mismatch"),
            ChaosResult::new("Pressure", false, "failed"),
        ];
        upsert_result(&mut results, ChaosResult::new("Verify", true, "ok"), "Verify");
        assert_eq!(
            messages(&results),
            ["Experimental: first", "Verify: ok", "Pressure: failed"]
        );
        assert!(results[1].success);
    }

    #[test]
    fn repeated_upserts_keep_one_entry() {
        let mut results = Vec::new();
        for _ in 0..3 {
            upsert_result(&mut results, ChaosResult::new("Verify", true, "ok"), "Verify");
        }
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn collapses_preexisting_duplicates() {
        let mut results = vec![
            ChaosResult::new("Verify", false, "a"),
            ChaosResult::new("Pressure", true, "b"),
            ChaosResult::new("Verify", false, "c"),
        ];
        upsert_result(&mut results, ChaosResult::new("Verify", true, "d"), "Verify");
        assert_eq!(messages(&results), ["Verify: d", "Pressure: b"]);
    }

    #[test]
    fn prefix_sharing_checks_stay_separate() {
        let mut results = vec![ChaosResult::new("VerifyLatency", true, "fine")];
        upsert_result(&mut results, ChaosResult::new("Verify", true, "ok"), "Verify");
        assert_eq!(results.len(), 2);
        assert!(has_result(&results, "Verify"));
        assert!(!has_result(&results, "Pressure"));
    }
}
