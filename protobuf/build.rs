fn main() {
    println!("cargo:rerun-if-changed=./egress_ipc.proto");
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .unwrap_or_else(|err| panic!("No protoc available {:?}", err));
        std::env::set_var("PROTOC", protoc);
    }
    tonic_build::compile_protos("./egress_ipc.proto")
        .unwrap_or_else(|err| panic!("Failed to compile protos {:?}", err));
}
