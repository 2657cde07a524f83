#[cfg(feature = "lua")]
mod map;
#[cfg(feature = "lua")]
mod reduce;
