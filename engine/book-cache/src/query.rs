//! Filtered reads over the caches and the history store
//!
//! A zero trader or account id means "no filter" on that dimension. Cache
//! reads return snapshots, not live views.

use crate::error::Result;
use crate::history::{HistoryQuery, HistoryStore};
use crate::store::{AccountStore, PositionStore};
use crate::types::{Account, ClosedPosition, Position};
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Parameters of a closed-position query
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPositionFilter {
    pub trader_id: i64,
    pub account_id: i64,
    /// Smallest id to return (inclusive)
    pub start_id: i64,
    pub limit: i64,
    pub from: NaiveDateTime,
    pub till: NaiveDateTime,
}

/// Open positions, optionally restricted to the accounts of one trader
pub fn open_positions(accounts: &AccountStore, positions: &PositionStore, trader_id: i64) -> Vec<Position> {
    if trader_id == 0 {
        return positions.snapshot();
    }

    let trader_accounts: HashSet<i64> = accounts
        .collect_where(|account| account.trader_id == trader_id)
        .into_iter()
        .map(|account| account.account_id)
        .collect();

    if trader_accounts.is_empty() {
        return Vec::new();
    }

    positions.collect_where(|position| trader_accounts.contains(&position.account_id))
}

/// Accounts matching both filters
pub fn filter_accounts(accounts: &AccountStore, trader_id: i64, account_id: i64) -> Vec<Account> {
    accounts.collect_where(|account| {
        (trader_id == 0 || account.trader_id == trader_id)
            && (account_id == 0 || account.account_id == account_id)
    })
}

/// Account ids a history query is restricted to; empty means unrestricted.
///
/// The trader filter resolves through the account cache and is narrowed by
/// `account_id`; an account filter alone is used as given.
pub fn history_accounts(accounts: &AccountStore, trader_id: i64, account_id: i64) -> Vec<i64> {
    if trader_id != 0 {
        let mut ids: Vec<i64> = filter_accounts(accounts, trader_id, account_id)
            .into_iter()
            .map(|account| account.account_id)
            .collect();
        ids.sort_unstable();
        ids
    } else if account_id != 0 {
        vec![account_id]
    } else {
        Vec::new()
    }
}

/// One page of closed positions
pub async fn closed_positions(
    accounts: &AccountStore,
    history: &dyn HistoryStore,
    filter: &ClosedPositionFilter,
) -> Result<Vec<ClosedPosition>> {
    let query = HistoryQuery {
        account_ids: history_accounts(accounts, filter.trader_id, filter.account_id),
        from: filter.from,
        till: filter.till,
        start_id: filter.start_id,
        limit: filter.limit,
    };

    history.select_history(&query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::types::{AccountRecord, TradeRecord};
    use chrono::NaiveDate;

    fn add_account(store: &AccountStore, id: i64, trader: i64) {
        let record = AccountRecord { id, trader, balance: 100.0, ..Default::default() };
        store.store(id, Account::from(record));
    }

    fn add_position(store: &PositionStore, id: i64, account: i64) {
        let record = TradeRecord {
            id,
            account,
            pair: 1,
            amount: 1.0,
            opened: "2024-01-01T00:00:00".to_string(),
            ..Default::default()
        };
        store.store(id, record.into_position().unwrap());
    }

    fn fixture() -> (AccountStore, PositionStore) {
        let accounts = AccountStore::new();
        add_account(&accounts, 1, 9);
        add_account(&accounts, 2, 9);
        add_account(&accounts, 3, 4);

        let positions = PositionStore::new();
        add_position(&positions, 10, 1);
        add_position(&positions, 11, 2);
        add_position(&positions, 12, 3);
        add_position(&positions, 13, 99);
        (accounts, positions)
    }

    fn ids<T>(items: Vec<T>, id: impl Fn(&T) -> i64) -> Vec<i64> {
        let mut ids: Vec<i64> = items.iter().map(id).collect();
        ids.sort_unstable();
        ids
    }

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_open_positions_filters_by_trader() {
        let (accounts, positions) = fixture();

        assert_eq!(ids(open_positions(&accounts, &positions, 0), |p| p.id), vec![10, 11, 12, 13]);
        assert_eq!(ids(open_positions(&accounts, &positions, 9), |p| p.id), vec![10, 11]);
        assert_eq!(ids(open_positions(&accounts, &positions, 4), |p| p.id), vec![12]);
        assert!(open_positions(&accounts, &positions, 77).is_empty());
    }

    #[test]
    fn test_filter_accounts_wildcards() {
        let (accounts, _) = fixture();

        assert_eq!(ids(filter_accounts(&accounts, 0, 0), |a| a.account_id), vec![1, 2, 3]);
        assert_eq!(ids(filter_accounts(&accounts, 9, 0), |a| a.account_id), vec![1, 2]);
        assert_eq!(ids(filter_accounts(&accounts, 0, 3), |a| a.account_id), vec![3]);
        assert_eq!(ids(filter_accounts(&accounts, 9, 2), |a| a.account_id), vec![2]);
        assert!(filter_accounts(&accounts, 4, 2).is_empty());
    }

    #[test]
    fn test_history_accounts_resolution() {
        let (accounts, _) = fixture();

        assert_eq!(history_accounts(&accounts, 9, 0), vec![1, 2]);
        assert_eq!(history_accounts(&accounts, 9, 2), vec![2]);
        assert_eq!(history_accounts(&accounts, 0, 42), vec![42]);
        assert!(history_accounts(&accounts, 0, 0).is_empty());
        assert!(history_accounts(&accounts, 77, 0).is_empty());
    }

    #[tokio::test]
    async fn test_closed_positions_passes_resolved_query() {
        let (accounts, _) = fixture();
        let history = MemoryHistory::new(Vec::new(), Vec::new());

        let filter = ClosedPositionFilter {
            trader_id: 9,
            account_id: 0,
            start_id: 100,
            limit: 50,
            from: day(1),
            till: day(31),
        };
        closed_positions(&accounts, &history, &filter).await.unwrap();

        let queries = history.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].account_ids, vec![1, 2]);
        assert_eq!(queries[0].start_id, 100);
        assert_eq!(queries[0].limit, 50);
    }

    #[tokio::test]
    async fn test_closed_positions_propagates_errors() {
        let (accounts, _) = fixture();
        let history = MemoryHistory::new(Vec::new(), Vec::new());
        history.set_unavailable(true);

        let filter = ClosedPositionFilter {
            trader_id: 0,
            account_id: 0,
            start_id: 0,
            limit: 10,
            from: day(1),
            till: day(2),
        };
        assert!(closed_positions(&accounts, &history, &filter).await.is_err());
    }

    mod properties {
        use super::{add_account, ids};
        use crate::query::filter_accounts;
        use crate::store::AccountStore;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_zero_filters_are_independent_wildcards(
                traders in prop::collection::btree_map(1i64..40, 1i64..5, 0..20),
                trader_id in 0i64..6,
                account_id in 0i64..42,
            ) {
                let accounts = AccountStore::new();
                for (&id, &trader) in &traders {
                    add_account(&accounts, id, trader);
                }

                let all: Vec<i64> = traders.keys().copied().collect();
                prop_assert_eq!(ids(filter_accounts(&accounts, 0, 0), |a| a.account_id), all);

                let by_trader = ids(filter_accounts(&accounts, trader_id, 0), |a| a.account_id);
                let by_account = ids(filter_accounts(&accounts, 0, account_id), |a| a.account_id);
                let both: Vec<i64> =
                    by_trader.iter().copied().filter(|id| by_account.contains(id)).collect();
                prop_assert_eq!(
                    ids(filter_accounts(&accounts, trader_id, account_id), |a| a.account_id),
                    both
                );

                for &id in &by_trader {
                    prop_assert!(trader_id == 0 || traders[&id] == trader_id);
                }
                for &id in &by_account {
                    prop_assert!(account_id == 0 || id == account_id);
                }
            }
        }
    }
}
