//! Generated protobuf modules
//!
//! `build.rs` compiles the Meshtastic client API subset under `protos/` with
//! prost; the package is emitted as a single `meshtastic.rs` in `OUT_DIR`.

pub mod meshtastic_generated {
    //! Generated Meshtastic protobuf types.
    #[allow(dead_code, clippy::all)]
    mod inner {
        include!(concat!(env!("OUT_DIR"), "/meshtastic.rs"));
    }
    pub use inner::*;
}
