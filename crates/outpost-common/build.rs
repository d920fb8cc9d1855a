//! ---
//! upd_section: "01-core-runtime"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "build"
//! upd_description: "Build-time metadata capture for version reporting."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Missing git metadata (e.g. release tarball builds) falls back to
    // default values instead of failing the build.
    EmitBuilder::builder().all_cargo().all_git().emit()?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
