fn main() {
    println!("cargo:rerun-if-changed=./cloudjob.proto");
    tonic_build::compile_protos("./cloudjob.proto")
        .unwrap_or_else(|err| panic!("Failed to compile protos {:?}", err));
}
