fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure().compile_protos(&["proto/nlq.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/nlq.proto");
    println!("cargo:rerun-if-changed=migrations");

    Ok(())
}
