//! Overflow-checked size arithmetic.
//!
//! Every size that ends up driving a mapping request passes through here.
//! `calloc(huge, huge)` must never wrap around into a small allocation.

/// Multiplies `a` by `b`, returning `None` if the product does not fit in a
/// `usize`.
///
/// No wider intermediate type is used: the (possibly wrapped) product is
/// divided back by `a` and both quotient and remainder are checked.
pub const fn checked_multiply(
  a: usize,
  b: usize,
) -> Option<usize> {
  if a == 0 || b == 0 {
    return Some(0);
  }

  let product = a.wrapping_mul(b);

  if product % a != 0 || product / a != b {
    return None;
  }

  Some(product)
}

/// Adds `a` and `b`, returning `None` on wrap-around.
pub const fn checked_add(
  a: usize,
  b: usize,
) -> Option<usize> {
  let sum = a.wrapping_add(b);

  if sum < a { None } else { Some(sum) }
}

/// Rounds `value` up to the next whole multiple of `unit`.
///
/// `unit` must be non-zero. Returns `None` if the result would not fit.
pub const fn round_up_to_multiple(
  value: usize,
  unit: usize,
) -> Option<usize> {
  let units = value.div_ceil(unit);
  checked_multiply(units, unit)
}
