use crate::error::{Result, SimError};

pub fn check_equal_length(
    left_len: usize,
    right_len: usize,
    left_name: &str,
    right_name: &str,
) -> Result<()> {
    if left_len != right_len {
        return Err(SimError::dimension(
            format!("{left_name} (against {right_name})"),
            right_len,
            left_len,
        ));
    }
    Ok(())
}

/// `exclusive` rejects the endpoints themselves.
pub fn check_range_f64(value: f64, min: f64, max: f64, exclusive: bool, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(SimError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    let below = if exclusive { value <= min } else { value < min };
    let above = if exclusive { value >= max } else { value > max };
    if below || above {
        let (open, close) = if exclusive { ('(', ')') } else { ('[', ']') };
        return Err(SimError::InvalidArgument(format!(
            "Value of {name} ({value}) should lie in {open}{min}, {max}{close}"
        )));
    }
    Ok(())
}

pub fn check_all_in_range(
    values: &[f64],
    min: f64,
    max: f64,
    exclusive: bool,
    name: &str,
) -> Result<()> {
    for (i, v) in values.iter().enumerate() {
        check_range_f64(*v, min, max, exclusive, &format!("{name}[{i}]"))?;
    }
    Ok(())
}
