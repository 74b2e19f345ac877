//! Command handlers, one module per subcommand.

pub(crate) mod subtitles;
pub(crate) mod translate;
pub(crate) mod watch;
