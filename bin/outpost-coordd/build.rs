//! ---
//! upd_section: "01-core-functionality"
//! upd_subsection: "binary"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Binary entrypoint for the coordinator daemon."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Builds from release tarballs have no git metadata; the version
    // surface falls back to "unknown" fields instead of failing.
    EmitBuilder::builder().all_cargo().all_git().emit()?;
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
