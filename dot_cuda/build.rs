fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "cuda")]
    {
        use cuda_builder::CudaBuilder;

        println!("cargo:rerun-if-changed=../dot_gpu/src");
        CudaBuilder::new("../dot_gpu")
            .copy_to("../resources/dot_gpu.ptx")
            .build()
            .unwrap();
    }
}
