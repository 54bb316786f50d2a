fn main() {
    println!("cargo:rerun-if-changed=proto/freeze.proto");

    volo_build::Builder::protobuf()
        .add_service("proto/freeze.proto")
        .include_dirs(vec![std::path::PathBuf::from(".")])
        .write()
        .unwrap();
}
