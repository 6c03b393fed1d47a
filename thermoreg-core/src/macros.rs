#[macro_export]
/// Generates a String similar to output of `dbg` but without printing
macro_rules! format_dbg {
    ($dbg_expr:expr) => {
        format!(
            "[{}:{}] {}: {:?}",
            file!(),
            line!(),
            stringify!($dbg_expr),
            $dbg_expr
        )
    };
    () => {
        format!("[{}:{}]", file!(), line!())
    };
}

#[macro_export]
/// Builds a [ThermoError::Configuration](crate::error::ThermoError) from a
/// format string, for use with `bail!` and `ensure!`
macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::ThermoError::Configuration(format!($($arg)*))
    };
}
