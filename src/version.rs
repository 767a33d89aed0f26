// Version announced to the wallet peer after the channel opens.

/// Library version, sent in the config response answering `peerLoaded`.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");
