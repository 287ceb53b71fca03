use anyhow::anyhow;
use byte_unit::{AdjustedByte, Byte, UnitType};

pub trait TryIntoAdjustedByte {
    fn adjusted(self) -> anyhow::Result<AdjustedByte>;
}

pub trait IntoAdjustedByte {
    fn adjusted(self) -> AdjustedByte;
}

impl TryIntoAdjustedByte for f64 {
    fn adjusted(self) -> anyhow::Result<AdjustedByte> {
        Byte::from_f64(self)
            .ok_or(anyhow!("size out of range: {self}"))
            .map(|b| b.get_appropriate_unit(UnitType::Decimal))
    }
}

impl IntoAdjustedByte for u64 {
    fn adjusted(self) -> AdjustedByte {
        Byte::from_u64(self).get_appropriate_unit(UnitType::Decimal)
    }
}
