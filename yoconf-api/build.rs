//! Build script for yoconf-api
//!
//! Compiles the Protocol Buffer definitions when the `grpc` feature is on.
//! Without it no protoc is needed.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "grpc")]
    {
        tonic_prost_build::configure()
            .build_server(true)
            .build_client(true)
            .compile_protos(&["proto/yoconf.proto"], &["proto"])?;
        println!("cargo:rerun-if-changed=proto/yoconf.proto");
    }

    Ok(())
}
