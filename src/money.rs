use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Fractional digits kept for every stored amount.
pub const AMOUNT_SCALE: u32 = 4;

/// Canonical fixed-point form of an amount: four fractional digits, trailing zeros dropped.
pub fn decimal_amount(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Serde hook that canonicalizes amounts given as numbers or strings.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    <Decimal as Deserialize>::deserialize(deserializer).map(decimal_amount)
}

pub fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Decimal>::deserialize(deserializer).map(|value| value.map(decimal_amount))
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Currency {
    Irr,
    Irt,
    Usd,
    Eur,
    Gbp,
    Usdt,
    Btc,
    Eth,
}
