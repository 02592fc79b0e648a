fn main() {
    #[cfg(feature = "generate")]
    {
        tonic_build::configure()
            .build_server(false)
            .out_dir("src")
            .compile(
                &[
                    "proto/loglite/v1/common.proto",
                    "proto/loglite/v1/publisher.proto",
                    "proto/loglite/v1/admin.proto",
                ],
                &["proto"],
            )
            .expect("failed to generate loglite.v1");
    }
}
