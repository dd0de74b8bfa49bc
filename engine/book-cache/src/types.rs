//! Type definitions for the mirrored book

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Textual format of the `opened` field in trade payloads
pub const OPENED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Instrument reference data, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub symbol: String,
    pub market: String,
    pub quote_currency: String,
    pub min_trade_size: f64,
    pub precision: f64,
    pub contract_size: f64,
    pub bid: f64,
    pub ask: f64,
    pub quoted_at: Option<NaiveDateTime>,
}

/// Trading account mirrored from the bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: i64,
    pub account_type: String,
    pub trader_id: i64,
    pub balance: f64,
    pub currency: String,
    pub office_id: i64,
    pub margin_scheduler: bool,
    pub margin_level: bool,
    pub margin_requirement: f64,
    pub margin_coeff: f64,
    pub day_coeff: f64,
}

/// Open position mirrored from the bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub account_id: i64,
    pub instrument_id: i64,
    pub amount: f64,
    pub open_price: f64,
    pub side: String,
    pub fee: f64,
    pub fee2: f64,
    pub swap: f64,
    pub swap2: f64,
    pub bonus: f64,
    /// Running profit/loss, patched by valuation messages
    pub profit_loss: f64,
    pub opened: NaiveDateTime,
    pub commentary: String,
}

/// Closed position read from trade history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub account_id: i64,
    pub instrument_id: i64,
    pub contract_size: f64,
    pub open_lots: f64,
    pub close_lots: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub side: String,
    pub fee: f64,
    pub swap: f64,
    pub profit_loss: f64,
    pub opened: NaiveDateTime,
    pub closed: NaiveDateTime,
    pub commentary: String,
    pub position_id: i64,
}

/// Account payload as stored under `account.<id>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountRecord {
    pub id: i64,
    pub trader: i64,
    pub balance: f64,
    #[serde(rename = "crncy")]
    pub currency: String,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(rename = "mrgn_scheduler")]
    pub margin_scheduler: String,
    #[serde(rename = "acct_mrgn_lvl")]
    pub margin_level: String,
    #[serde(rename = "mrgn_req")]
    pub margin_requirement: f64,
    #[serde(rename = "mrgn_coeff")]
    pub margin_coeff: f64,
    #[serde(rename = "mrgn_day_coeff")]
    pub day_coeff: f64,
    pub office: i64,
}

/// Trade payload as stored under `trade.<id>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradeRecord {
    #[serde(rename = "trade")]
    pub id: i64,
    pub account: i64,
    pub pair: i64,
    pub amount: f64,
    pub price: f64,
    #[serde(rename = "sellbuy")]
    pub side: String,
    pub fee: f64,
    pub fee2: f64,
    pub swap: f64,
    pub swap2: f64,
    pub bonus: f64,
    pub opened: String,
    pub commentary: String,
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Self {
            account_id: record.id,
            account_type: record.account_type,
            trader_id: record.trader,
            balance: record.balance,
            currency: record.currency,
            office_id: record.office,
            margin_scheduler: record.margin_scheduler == "Y",
            margin_level: record.margin_level == "Y",
            margin_requirement: record.margin_requirement,
            margin_coeff: record.margin_coeff,
            day_coeff: record.day_coeff,
        }
    }
}

impl Account {
    /// Apply the fields a repeated account event is allowed to change
    pub fn refresh_from(&mut self, record: &AccountRecord) {
        self.balance = record.balance;
        self.trader_id = record.trader;
        self.currency = record.currency.clone();
    }
}

impl TradeRecord {
    /// Build the cached position, parsing the open timestamp
    pub fn into_position(self) -> Result<Position, chrono::ParseError> {
        let opened = NaiveDateTime::parse_from_str(&self.opened, OPENED_FORMAT)?;

        Ok(Position {
            id: self.id,
            account_id: self.account,
            instrument_id: self.pair,
            amount: self.amount,
            open_price: self.price,
            side: self.side,
            fee: self.fee,
            fee2: self.fee2,
            swap: self.swap,
            swap2: self.swap2,
            bonus: self.bonus,
            profit_loss: 0.0,
            opened,
            commentary: self.commentary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_record_decodes_compact_tags() {
        let raw = r#"{"id":42,"trader":7,"balance":1000.5,"crncy":"USD","type":"live","mrgn_scheduler":"Y","acct_mrgn_lvl":"N","mrgn_req":0.05,"mrgn_coeff":1.0,"mrgn_day_coeff":1.0,"office":3}"#;
        let record: AccountRecord = serde_json::from_str(raw).unwrap();
        let account = Account::from(record);

        assert_eq!(account.account_id, 42);
        assert_eq!(account.trader_id, 7);
        assert_eq!(account.balance, 1000.5);
        assert_eq!(account.currency, "USD");
        assert_eq!(account.account_type, "live");
        assert!(account.margin_scheduler);
        assert!(!account.margin_level);
        assert_eq!(account.margin_requirement, 0.05);
        assert_eq!(account.office_id, 3);
    }

    #[test]
    fn test_refresh_touches_only_mutable_fields() {
        let first: AccountRecord = serde_json::from_str(
            r#"{"id":1,"trader":9,"balance":100,"crncy":"USD","type":"live","office":4}"#,
        )
        .unwrap();
        let mut account = Account::from(first);

        let second: AccountRecord = serde_json::from_str(
            r#"{"id":1,"trader":10,"balance":250,"crncy":"EUR","type":"demo","office":8}"#,
        )
        .unwrap();
        account.refresh_from(&second);

        assert_eq!(account.trader_id, 10);
        assert_eq!(account.balance, 250.0);
        assert_eq!(account.currency, "EUR");
        assert_eq!(account.account_type, "live");
        assert_eq!(account.office_id, 4);
    }

    #[test]
    fn test_trade_record_missing_fields_default_to_zero() {
        let raw = r#"{"trade":5,"account":1,"pair":2,"amount":1.5,"price":1.2345,"sellbuy":"buy","opened":"2024-01-01T00:00:00"}"#;
        let record: TradeRecord = serde_json::from_str(raw).unwrap();
        let position = record.into_position().unwrap();

        assert_eq!(position.id, 5);
        assert_eq!(position.account_id, 1);
        assert_eq!(position.instrument_id, 2);
        assert_eq!(position.side, "buy");
        assert_eq!(position.fee, 0.0);
        assert_eq!(position.profit_loss, 0.0);
        assert_eq!(position.opened.to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_trade_record_rejects_bad_timestamp() {
        let record = TradeRecord {
            id: 1,
            opened: "01/01/2024 00:00".to_string(),
            ..Default::default()
        };
        assert!(record.into_position().is_err());
    }
}
