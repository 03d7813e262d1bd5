pub mod refresh;
pub mod whoami;

pub use refresh::refresh_post;
pub use whoami::whoami_get;
