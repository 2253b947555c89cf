fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "grpc")]
    {
        let descriptor_path =
            std::path::PathBuf::from(std::env::var("OUT_DIR")?).join("race.bin");
        tonic_build::configure()
            .file_descriptor_set_path(descriptor_path)
            .compile(&["src/app/server/grpc/race.proto"], &["src/app/server/grpc"])?;
    }

    Ok(())
}
