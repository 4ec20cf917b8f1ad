//! Operator table: filter tokens, operand rules and their SQL rendering.

use crate::error::AppError;
use crate::sql::QueryBuf;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    NotBetween,
    In,
    NotIn,
    Starts,
    Ends,
    Contains,
    Excludes,
    NotLike,
    IsNull,
    IsNotNull,
    Field,
    EqLower,
    NeLower,
    StartsLower,
    EndsLower,
    ContainsLower,
    ExcludesLower,
}

/// Validated right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Null checks bind nothing.
    None,
    Value(Value),
    Pair(Value, Value),
    List(Vec<Value>),
    /// Another column of the same row, already qualified: `"users"."updatedAt"`.
    Column { sql: String, compare: Operator },
}

impl Operator {
    pub fn parse(token: &str) -> Result<Self, AppError> {
        Ok(match token {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$between" => Operator::Between,
            "$notBetween" => Operator::NotBetween,
            "$in" => Operator::In,
            "$nin" => Operator::NotIn,
            "$starts" => Operator::Starts,
            "$ends" => Operator::Ends,
            "$cont" => Operator::Contains,
            "$excl" => Operator::Excludes,
            "$notLike" => Operator::NotLike,
            "$isNull" => Operator::IsNull,
            "$isNotNull" | "$notNull" => Operator::IsNotNull,
            "$field" => Operator::Field,
            "$eqL" => Operator::EqLower,
            "$neL" => Operator::NeLower,
            "$startsL" => Operator::StartsLower,
            "$endsL" => Operator::EndsLower,
            "$contL" => Operator::ContainsLower,
            "$exclL" => Operator::ExcludesLower,
            other => {
                return Err(AppError::UnsupportedOperator {
                    operator: other.to_string(),
                })
            }
        })
    }

    pub fn token(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Between => "$between",
            Operator::NotBetween => "$notBetween",
            Operator::In => "$in",
            Operator::NotIn => "$nin",
            Operator::Starts => "$starts",
            Operator::Ends => "$ends",
            Operator::Contains => "$cont",
            Operator::Excludes => "$excl",
            Operator::NotLike => "$notLike",
            Operator::IsNull => "$isNull",
            Operator::IsNotNull => "$isNotNull",
            Operator::Field => "$field",
            Operator::EqLower => "$eqL",
            Operator::NeLower => "$neL",
            Operator::StartsLower => "$startsL",
            Operator::EndsLower => "$endsL",
            Operator::ContainsLower => "$contL",
            Operator::ExcludesLower => "$exclL",
        }
    }

    /// Parameter name suffix.
    pub fn suffix(self) -> &'static str {
        self.token().trim_start_matches('$')
    }

    /// Whether a mapping key is an operator token rather than a field name.
    pub fn is_token(key: &str) -> bool {
        key.starts_with('$')
    }

    /// Check the operand shape for this operator. Returns the (possibly inverted)
    /// operator: `$isNull: false` reads as `$isNotNull`.
    pub fn operand(self, field: &str, value: &Value) -> Result<(Operator, Operand), AppError> {
        let invalid = |reason: &str| AppError::invalid_operand(field, self.token(), reason);
        match self {
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                if value.is_array() || value.is_object() {
                    return Err(invalid("expected a scalar value"));
                }
                Ok((self, Operand::Value(value.clone())))
            }
            Operator::Between | Operator::NotBetween => match value.as_array() {
                Some(items) if items.len() == 2 => Ok((self, Operand::Pair(items[0].clone(), items[1].clone()))),
                Some(items) => Err(invalid(&format!("expected exactly 2 values, got {}", items.len()))),
                None => Err(invalid("expected an array of 2 values")),
            },
            Operator::In | Operator::NotIn => match value.as_array() {
                Some(items) if !items.is_empty() => Ok((self, Operand::List(items.clone()))),
                Some(_) => Err(invalid("expected a non-empty array")),
                None => Err(invalid("expected an array")),
            },
            Operator::IsNull | Operator::IsNotNull => {
                if value == &Value::Bool(false) {
                    let inverted = if self == Operator::IsNull {
                        Operator::IsNotNull
                    } else {
                        Operator::IsNull
                    };
                    return Ok((inverted, Operand::None));
                }
                Ok((self, Operand::None))
            }
            Operator::Field => Err(invalid("column operands are resolved by the condition compiler")),
            Operator::EqLower
            | Operator::NeLower
            | Operator::StartsLower
            | Operator::EndsLower
            | Operator::ContainsLower
            | Operator::ExcludesLower => {
                // Compared against LOWER(column).
                let text = text_operand(value).ok_or_else(|| invalid("expected a string"))?;
                Ok((self, Operand::Value(Value::String(text.to_lowercase()))))
            }
            Operator::Starts | Operator::Ends | Operator::Contains | Operator::Excludes | Operator::NotLike => {
                let text = text_operand(value).ok_or_else(|| invalid("expected a string"))?;
                Ok((self, Operand::Value(Value::String(text))))
            }
        }
    }

    /// Render `lhs <op> rhs`, binding operand values into `q` in text order.
    /// `hint` is the parameter name stem (`alias.column`).
    pub fn render(self, lhs: &str, operand: &Operand, hint: &str, cast: Option<&str>, q: &mut QueryBuf) -> String {
        let name = format!("{}_{}", hint, self.suffix());
        match (self, operand) {
            (Operator::IsNull, _) => format!("{} IS NULL", lhs),
            (Operator::IsNotNull, _) => format!("{} IS NOT NULL", lhs),
            (Operator::Eq, Operand::Value(Value::Null)) => format!("{} IS NULL", lhs),
            (Operator::Ne, Operand::Value(Value::Null)) => format!("{} IS NOT NULL", lhs),
            (_, Operand::Column { sql, compare }) => format!("{} {} {}", lhs, comparison(*compare), sql),
            (Operator::Between | Operator::NotBetween, Operand::Pair(low, high)) => {
                let low = q.bind_cast(&format!("{}_0", name), low.clone(), cast);
                let high = q.bind_cast(&format!("{}_1", name), high.clone(), cast);
                let not = if self == Operator::NotBetween { "NOT " } else { "" };
                format!("{} {}BETWEEN {} AND {}", lhs, not, low, high)
            }
            (Operator::In | Operator::NotIn, Operand::List(items)) => {
                let placeholders: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| q.bind_cast(&format!("{}_{}", name, i), v.clone(), cast))
                    .collect();
                let not = if self == Operator::NotIn { "NOT " } else { "" };
                format!("{} {}IN ({})", lhs, not, placeholders.join(", "))
            }
            (_, Operand::Value(v)) => {
                let text = v.as_str().unwrap_or_default();
                let ci = q.dialect().ci_like();
                match self {
                    Operator::Starts => format!("{} LIKE {}", lhs, q.bind(&name, Value::String(format!("{}%", text)))),
                    Operator::Ends => format!("{} LIKE {}", lhs, q.bind(&name, Value::String(format!("%{}", text)))),
                    Operator::Contains => format!("{} LIKE {}", lhs, q.bind(&name, Value::String(format!("%{}%", text)))),
                    Operator::Excludes => {
                        format!("{} NOT LIKE {}", lhs, q.bind(&name, Value::String(format!("%{}%", text))))
                    }
                    Operator::NotLike => format!("{} NOT LIKE {}", lhs, q.bind(&name, v.clone())),
                    Operator::EqLower => format!("LOWER({}) = {}", lhs, q.bind(&name, v.clone())),
                    Operator::NeLower => format!("LOWER({}) != {}", lhs, q.bind(&name, v.clone())),
                    Operator::StartsLower => {
                        format!("LOWER({}) {} {}", lhs, ci, q.bind(&name, Value::String(format!("{}%", text))))
                    }
                    Operator::EndsLower => {
                        format!("LOWER({}) {} {}", lhs, ci, q.bind(&name, Value::String(format!("%{}", text))))
                    }
                    Operator::ContainsLower => {
                        format!("LOWER({}) {} {}", lhs, ci, q.bind(&name, Value::String(format!("%{}%", text))))
                    }
                    Operator::ExcludesLower => {
                        format!("LOWER({}) NOT {} {}", lhs, ci, q.bind(&name, Value::String(format!("%{}%", text))))
                    }
                    _ => format!("{} {} {}", lhs, comparison(self), q.bind_cast(&name, v.clone(), cast)),
                }
            }
            // Unreachable for operands built by `operand`; matches nothing.
            (_, _) => "1 = 0".to_string(),
        }
    }
}

fn comparison(op: Operator) -> &'static str {
    match op {
        Operator::Ne => "!=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        _ => "=",
    }
}

/// Comparison operators allowed inside `$field: { field, operator }`.
pub fn column_comparison(token: &str) -> Result<Operator, AppError> {
    match Operator::parse(token)? {
        op @ (Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte) => Ok(op),
        _ => Err(AppError::UnsupportedOperator {
            operator: token.to_string(),
        }),
    }
}

fn text_operand(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
