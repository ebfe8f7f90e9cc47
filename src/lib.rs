//! Workspace placeholder crate.
//!
//! This crate exposes the feature flags that wire the individual workspace
//! crates together (`core-runtime`, `core-playback`, `bridge-desktop`). Host
//! applications can depend on `tube-session-workspace` and enable the
//! documented features instead of listing every crate.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use core_playback;
#[cfg(feature = "desktop-shims")]
pub use core_runtime;
