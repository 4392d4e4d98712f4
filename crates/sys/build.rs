use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=OPENTDF_LIB_DIR");

    if let Ok(dir) = env::var("OPENTDF_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }

    println!("cargo:rustc-link-lib=static=opentdf_static_combined");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
        println!("cargo:rustc-link-lib=dylib=pthread");
        println!("cargo:rustc-link-lib=dylib=dl");
        println!("cargo:rustc-link-lib=dylib=m");
    }
    println!("cargo:rustc-link-lib=dylib=stdc++");
}
