//! Pure per-record conversion from upstream payloads to storage rows.

use chrono::NaiveDate;
use polyhouse_polygon::{RawTickerDetails, RawTrade};
use polyhouse_schemas::{EnumRegistry, TickerRow, TradeRow};

use crate::error::IngestError;

/// Longest decimal trade id that can still fit in a u64.
const MAX_NUMERIC_ID_LEN: usize = 20;

/// Encode an upstream trade id as a u64.
///
/// Ids of up to 8 bytes are packed little-endian (null padded on the right),
/// which keeps distinct ids of that length class distinct. Longer ids must be
/// base-10 numerals that fit in 64 bits.
pub fn id_to_u64(id: &str) -> Result<u64, IngestError> {
    let bytes = id.as_bytes();
    match bytes.len() {
        0..=8 => {
            let mut buf = [0u8; 8];
            buf[..bytes.len()].copy_from_slice(bytes);
            Ok(u64::from_le_bytes(buf))
        }
        9..=MAX_NUMERIC_ID_LEN if !bytes.iter().all(u8::is_ascii_digit) => {
            Err(IngestError::IdEncoding {
                id: id.to_string(),
                reason: "not a decimal numeral".to_string(),
            })
        }
        9..=MAX_NUMERIC_ID_LEN => id.parse::<u64>().map_err(|e| IngestError::IdEncoding {
            id: id.to_string(),
            reason: e.to_string(),
        }),
        len => Err(IngestError::IdEncoding {
            id: id.to_string(),
            reason: format!("{} bytes exceeds {}", len, MAX_NUMERIC_ID_LEN),
        }),
    }
}

/// Keep the low byte of each condition code.
pub fn convert_to_u8(codes: &[i32]) -> Vec<u8> {
    codes.iter().map(|&c| c as u8).collect()
}

/// Upstream reports an unset timestamp as zero.
pub fn nullable_timestamp(ns: i64) -> Option<i64> {
    (ns != 0).then_some(ns)
}

pub fn trade_row(
    raw: RawTrade,
    symbol: &str,
    registry: &EnumRegistry,
) -> Result<TradeRow, IngestError> {
    let tape = registry.tapes().storage_code(raw.tape)?;
    let exchange = registry.participants().storage_code(raw.exchange)?;
    let trf = registry.participants().storage_code(raw.trf_id)?;

    let seqnum = u64::try_from(raw.sequence_number)
        .map_err(|_| invalid(symbol, "sequence_number", raw.sequence_number))?;
    let correction =
        u8::try_from(raw.correction).map_err(|_| invalid(symbol, "correction", raw.correction))?;
    if !raw.size.is_finite() || raw.size < 0.0 {
        return Err(invalid(symbol, "size", raw.size));
    }

    Ok(TradeRow {
        seqnum,
        tape,
        id: id_to_u64(&raw.id)?,
        ticker: symbol.to_string(),
        ts: raw.sip_timestamp,
        ts_participant: nullable_timestamp(raw.participant_timestamp),
        ts_trf: nullable_timestamp(raw.trf_timestamp),
        price: raw.price,
        // Fractional share sizes truncate
        size: raw.size as u32,
        conditions: convert_to_u8(&raw.conditions),
        correction,
        exchange,
        trf,
    })
}

pub fn ticker_row(
    raw: RawTickerDetails,
    symbol: &str,
    date: NaiveDate,
) -> Result<TickerRow, IngestError> {
    let sic_code = match raw.sic_code.trim() {
        "" => None,
        s => Some(s.parse::<u16>().map_err(|_| invalid(symbol, "sic_code", s))?),
    };
    let list_date = match raw.list_date.trim() {
        "" => None,
        s => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid(symbol, "list_date", s))?,
        ),
    };
    let total_employees = raw
        .total_employees
        .map(|n| u32::try_from(n).map_err(|_| invalid(symbol, "total_employees", n)))
        .transpose()?;

    let address = raw.address;
    Ok(TickerRow {
        ts: date,
        ticker: symbol.to_string(),
        name: raw.name,
        primary_exchange: raw.primary_exchange,
        ticker_type: raw.ticker_type,
        active: raw.active,
        cik: raw.cik,
        composite_figi: raw.composite_figi,
        share_class_figi: raw.share_class_figi,
        phone_number: raw.phone_number,
        description: raw.description,
        sic_code,
        sic_description: raw.sic_description,
        ticker_root: raw.ticker_root,
        homepage_url: raw.homepage_url,
        total_employees,
        list_date,
        delisted_utc: raw.delisted_utc,
        share_class_shares_outstanding: raw.share_class_shares_outstanding,
        weighted_shares_outstanding: raw.weighted_shares_outstanding,
        address1: address.address1,
        address2: address.address2,
        city: address.city,
        state: address.state,
        postal_code: address.postal_code,
    })
}

fn invalid(symbol: &str, field: &'static str, value: impl ToString) -> IngestError {
    IngestError::InvalidField {
        symbol: symbol.to_string(),
        field,
        value: value.to_string(),
    }
}
