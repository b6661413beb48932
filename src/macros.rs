//! Argument list macro.

/// Build a `Vec<Param>` from heterogeneous values.
///
/// # Example
///
/// ```ignore
/// client
///     .exec("UPDATE users SET name = $1 WHERE id = $2", &params!["ann", 7])
///     .await?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::from($value)),+]
    };
}
