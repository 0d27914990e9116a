//! Bootstraps the initial ranked identity list from the
//! `WAREHOUSE_ACCOUNTS`/`WAREHOUSE_PASSWORDS`/... CSV environment variables
//! (spec §6). Used only when no encrypted vault file exists yet; afterwards
//! the encrypted file is authoritative (spec §4.2 bootstrap note, expanded
//! in `SPEC_FULL.md` §4.2).

use actstream_error::CoreError;

use crate::ledger::CredentialRecord;

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Builds the ranked identity list from already-read CSV environment
/// values. Priorities/max-failures/cooldowns default when their CSV is
/// shorter than the account list.
pub fn identities_from_csv(
    accounts_csv: &str,
    passwords_csv: &str,
    priorities_csv: &str,
    max_failures_csv: &str,
    cooldown_ms_csv: &str,
) -> actstream_error::Result<Vec<CredentialRecord>> {
    let accounts = split_csv(accounts_csv);
    let passwords = split_csv(passwords_csv);
    if accounts.len() != passwords.len() {
        return Err(CoreError::invalid_argument(format!(
            "WAREHOUSE_ACCOUNTS has {} entries but WAREHOUSE_PASSWORDS has {}",
            accounts.len(),
            passwords.len()
        )));
    }
    let priorities = split_csv(priorities_csv);
    let max_failures = split_csv(max_failures_csv);
    let cooldowns = split_csv(cooldown_ms_csv);

    let mut records = Vec::with_capacity(accounts.len());
    for (i, (account, password)) in accounts.into_iter().zip(passwords).enumerate() {
        let priority: u8 = priorities.get(i).map(|s| s.parse()).transpose().map_err(|_| {
            CoreError::invalid_argument(format!("WAREHOUSE_ACCOUNT_PRIORITIES[{i}] is not a small integer"))
        })?.unwrap_or(u8::try_from(i + 1).unwrap_or(10));
        let mut record = CredentialRecord::new(account, password, priority);
        if let Some(mf) = max_failures.get(i) {
            record.max_failures = mf.parse().map_err(|_| {
                CoreError::invalid_argument(format!("WAREHOUSE_MAX_FAILURES[{i}] is not an integer"))
            })?;
        }
        if let Some(cd) = cooldowns.get(i) {
            record.cooldown_ms =
                cd.parse().map_err(|_| CoreError::invalid_argument(format!("WAREHOUSE_COOLDOWN_MS[{i}] is not an integer")))?;
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ranked_identities_from_matching_csvs() {
        let records = identities_from_csv("a,b,c", "pa,pb,pc", "1,2,3", "3,3,3", "1000,2000,3000").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].username, "a");
        assert_eq!(records[1].priority, 2);
        assert_eq!(records[2].cooldown_ms, 3000);
    }

    #[test]
    fn mismatched_account_password_counts_is_invalid_argument() {
        let err = identities_from_csv("a,b", "pa", "", "", "").unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn missing_optional_csvs_use_defaults() {
        let records = identities_from_csv("a", "pa", "", "", "").unwrap();
        assert_eq!(records[0].priority, 1);
        assert_eq!(records[0].max_failures, 3);
    }
}
