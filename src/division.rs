//! Division that reports a zero divisor as an error instead of producing
//! `inf` or `NaN`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DivisionError {
    #[error("division by zero")]
    ByZero,
}

pub fn division(a: f64, b: f64) -> Result<f64, DivisionError> {
    if b == 0.0 {
        return Err(DivisionError::ByZero);
    }
    Ok(a / b)
}
