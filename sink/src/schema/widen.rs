use crate::types::SqlType;

/// Largest precision MySQL accepts for `DECIMAL`.
const MAX_DECIMAL_PRECISION: u8 = 65;
/// Largest scale MySQL accepts for `DECIMAL`.
const MAX_DECIMAL_SCALE: u8 = 30;
/// Integer digits of a `BIGINT`.
const BIGINT_DIGITS: u8 = 19;
/// Width given to a scalar column converted to `VARCHAR`, enough for any rendered number or
/// timestamp.
const SCALAR_TEXT_WIDTH: u32 = 80;

/// Outcome of fitting a requested column type into an existing column.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Widening {
    /// The existing column already holds every value of the requested type.
    Satisfied,
    /// The existing column must be altered to the given type.
    Widen(SqlType),
    /// No type holds both without losing values.
    Conflict,
}

/// Decides how an `existing` column absorbs a `requested` type.
///
/// The result is never narrower than `existing`, so applying it repeatedly converges.
pub fn widen(existing: &SqlType, requested: &SqlType) -> Widening {
    use SqlType::*;

    if existing == requested {
        return Widening::Satisfied;
    }

    match (existing, requested) {
        (Other(_), _) | (Json, _) | (Text, _) => Widening::Satisfied,
        (_, Other(_)) => Widening::Satisfied,

        (Varchar(_), Json) => Widening::Conflict,
        (Varchar(current), Varchar(wanted)) => {
            if wanted > current {
                Widening::Widen(Varchar(*wanted))
            } else {
                Widening::Satisfied
            }
        }
        (Varchar(_), Text) => Widening::Widen(Text),
        (Varchar(current), _) if *current < SCALAR_TEXT_WIDTH => {
            Widening::Widen(Varchar(SCALAR_TEXT_WIDTH))
        }
        (Varchar(_), _) => Widening::Satisfied,

        (current, wanted) if current.is_integer() => widen_integer(current, wanted),

        (Decimal { precision, scale }, wanted) => widen_decimal(*precision, *scale, wanted),

        (Double, wanted) if wanted.is_integer() => Widening::Satisfied,
        (Double, Decimal { .. }) => Widening::Satisfied,
        (Double, wanted) if wanted.is_textual() => Widening::Widen(text_for(wanted)),
        (Double, _) => Widening::Conflict,

        (Date, Timestamp) => Widening::Widen(Timestamp),
        (Timestamp, Date) => Widening::Satisfied,
        (current, wanted) if current.is_temporal() && wanted.is_textual() => {
            Widening::Widen(text_for(wanted))
        }

        _ => Widening::Conflict,
    }
}

fn widen_integer(existing: &SqlType, requested: &SqlType) -> Widening {
    if requested.is_integer() {
        return if integer_rank(requested) > integer_rank(existing) {
            Widening::Widen(requested.clone())
        } else {
            Widening::Satisfied
        };
    }

    match requested {
        SqlType::Decimal { precision, scale } => {
            let integer_digits = precision.saturating_sub(*scale).max(BIGINT_DIGITS);
            Widening::Widen(decimal(integer_digits, *scale))
        }
        SqlType::Double => Widening::Widen(SqlType::Double),
        wanted if wanted.is_textual() => Widening::Widen(text_for(wanted)),
        _ => Widening::Conflict,
    }
}

fn widen_decimal(precision: u8, scale: u8, requested: &SqlType) -> Widening {
    let integer_digits = precision.saturating_sub(scale);

    match requested {
        wanted if wanted.is_integer() => {
            if integer_digits >= BIGINT_DIGITS {
                Widening::Satisfied
            } else {
                Widening::Widen(decimal(BIGINT_DIGITS, scale))
            }
        }
        SqlType::Decimal {
            precision: wanted_precision,
            scale: wanted_scale,
        } => {
            let merged = decimal(
                integer_digits.max(wanted_precision.saturating_sub(*wanted_scale)),
                scale.max(*wanted_scale),
            );

            if merged == (SqlType::Decimal { precision, scale }) {
                Widening::Satisfied
            } else {
                Widening::Widen(merged)
            }
        }
        wanted if wanted.is_textual() => Widening::Widen(text_for(wanted)),
        _ => Widening::Conflict,
    }
}

/// Builds a decimal holding `integer_digits` before and `scale` after the point, within
/// MySQL limits. Integer digits win over scale when both do not fit.
fn decimal(integer_digits: u8, scale: u8) -> SqlType {
    let integer_digits = integer_digits.min(MAX_DECIMAL_PRECISION);
    let scale = scale
        .min(MAX_DECIMAL_SCALE)
        .min(MAX_DECIMAL_PRECISION - integer_digits);

    SqlType::Decimal {
        precision: integer_digits + scale,
        scale,
    }
}

fn integer_rank(sql_type: &SqlType) -> u8 {
    match sql_type {
        SqlType::Boolean => 0,
        SqlType::SmallInt => 1,
        SqlType::Int => 2,
        _ => 3,
    }
}

/// Text type a scalar column becomes when a text type is requested for it.
fn text_for(requested: &SqlType) -> SqlType {
    match requested {
        SqlType::Varchar(length) => SqlType::Varchar((*length).max(SCALAR_TEXT_WIDTH)),
        _ => SqlType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SqlType::*;

    fn dec(precision: u8, scale: u8) -> SqlType {
        Decimal { precision, scale }
    }

    #[test]
    fn identical_types_are_satisfied() {
        assert_eq!(widen(&BigInt, &BigInt), Widening::Satisfied);
        assert_eq!(widen(&Varchar(10), &Varchar(10)), Widening::Satisfied);
    }

    #[test]
    fn text_and_json_absorb_everything() {
        for requested in [BigInt, dec(10, 2), Timestamp, Json, Varchar(100), Boolean] {
            assert_eq!(widen(&Text, &requested), Widening::Satisfied);
            assert_eq!(widen(&Json, &requested), Widening::Satisfied);
        }
    }

    #[test]
    fn varchar_grows_but_never_shrinks() {
        assert_eq!(widen(&Varchar(10), &Varchar(20)), Widening::Widen(Varchar(20)));
        assert_eq!(widen(&Varchar(20), &Varchar(10)), Widening::Satisfied);
        assert_eq!(widen(&Varchar(20), &Text), Widening::Widen(Text));
        assert_eq!(widen(&Varchar(100), &BigInt), Widening::Satisfied);
        assert_eq!(widen(&Varchar(20), &Json), Widening::Conflict);
    }

    #[test]
    fn short_varchar_grows_to_hold_rendered_scalars() {
        assert_eq!(widen(&Varchar(10), &Timestamp), Widening::Widen(Varchar(80)));
        assert_eq!(widen(&Varchar(10), &dec(38, 18)), Widening::Widen(Varchar(80)));
        assert_eq!(widen(&Varchar(79), &BigInt), Widening::Widen(Varchar(80)));
        assert_eq!(widen(&Varchar(80), &Timestamp), Widening::Satisfied);
        assert_eq!(widen(&Varchar(255), &Double), Widening::Satisfied);
    }

    #[test]
    fn integers_climb_the_ladder() {
        assert_eq!(widen(&SmallInt, &BigInt), Widening::Widen(BigInt));
        assert_eq!(widen(&BigInt, &SmallInt), Widening::Satisfied);
        assert_eq!(widen(&Boolean, &Int), Widening::Widen(Int));
        assert_eq!(widen(&BigInt, &Double), Widening::Widen(Double));
        assert_eq!(widen(&BigInt, &dec(38, 18)), Widening::Widen(dec(38, 18)));
        assert_eq!(widen(&BigInt, &dec(10, 2)), Widening::Widen(dec(21, 2)));
        assert_eq!(widen(&Int, &Varchar(10)), Widening::Widen(Varchar(80)));
        assert_eq!(widen(&Int, &Timestamp), Widening::Conflict);
        assert_eq!(widen(&Int, &Json), Widening::Conflict);
    }

    #[test]
    fn decimals_merge_digits_and_scale() {
        assert_eq!(widen(&dec(20, 4), &BigInt), Widening::Widen(dec(23, 4)));
        assert_eq!(widen(&dec(40, 18), &BigInt), Widening::Satisfied);
        assert_eq!(widen(&dec(10, 2), &dec(12, 4)), Widening::Widen(dec(12, 4)));
        assert_eq!(widen(&dec(10, 2), &dec(6, 4)), Widening::Widen(dec(12, 4)));
        assert_eq!(widen(&dec(12, 4), &dec(10, 2)), Widening::Satisfied);
        assert_eq!(widen(&dec(60, 30), &dec(65, 0)), Widening::Widen(dec(65, 0)));
        assert_eq!(widen(&dec(10, 2), &Double), Widening::Conflict);
        assert_eq!(widen(&dec(10, 2), &Text), Widening::Widen(Text));
    }

    #[test]
    fn double_holds_numbers_only() {
        assert_eq!(widen(&Double, &BigInt), Widening::Satisfied);
        assert_eq!(widen(&Double, &dec(10, 2)), Widening::Satisfied);
        assert_eq!(widen(&Double, &Text), Widening::Widen(Text));
        assert_eq!(widen(&Double, &Date), Widening::Conflict);
    }

    #[test]
    fn temporal_types_widen_towards_timestamp_then_text() {
        assert_eq!(widen(&Date, &Timestamp), Widening::Widen(Timestamp));
        assert_eq!(widen(&Timestamp, &Date), Widening::Satisfied);
        assert_eq!(widen(&Time, &Varchar(255)), Widening::Widen(Varchar(255)));
        assert_eq!(widen(&Date, &BigInt), Widening::Conflict);
        assert_eq!(widen(&Time, &Timestamp), Widening::Conflict);
    }

    #[test]
    fn unknown_existing_types_are_never_touched() {
        assert_eq!(
            widen(&Other("mediumint".to_string()), &BigInt),
            Widening::Satisfied
        );
    }
}
