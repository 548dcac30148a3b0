//! Configuration packaging for Module runs.
//!
//! A Module is run as a one-file root configuration: a `main.tf` that
//! declares the module's input variables, calls the module and re-exports
//! the selected outputs. It is uploaded as a gzipped tarball.

use std::fmt::Write as _;
use std::io::Write as _;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::crd::ModuleSpec;

pub const MAIN_TF: &str = "main.tf";

/// Render the root configuration for `spec`.
pub fn render_main_tf(spec: &ModuleSpec) -> String {
    let mut out = String::new();

    for v in &spec.variables {
        let _ = writeln!(out, "variable \"{}\" {{}}\n", v.name);
    }

    let _ = writeln!(out, "module \"{}\" {{", spec.name);
    let _ = writeln!(out, "  source = \"{}\"", spec.module.source);
    if let Some(version) = spec.module.version.as_deref().filter(|v| !v.is_empty()) {
        let _ = writeln!(out, "  version = \"{}\"", version);
    }
    for v in &spec.variables {
        let _ = writeln!(out, "  {} = var.{}", v.name, v.name);
    }
    out.push_str("}\n");

    for o in &spec.outputs {
        let _ = writeln!(out, "\noutput \"{}\" {{", o.name);
        let _ = writeln!(out, "  value = module.{}.{}", spec.name, o.name);
        if o.sensitive {
            out.push_str("  sensitive = true\n");
        }
        out.push_str("}\n");
    }

    out
}

/// Gzipped tarball holding a single `main.tf`.
pub fn archive(main_tf: &str) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let bytes = main_tf.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, MAIN_TF, bytes)?;

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}
