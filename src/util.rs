use std::{fs, path::Path};
use anyhow::Context;


pub fn read_to_string<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
Ok(fs::read_to_string(&p).with_context(|| format!("read file {:?}", p.as_ref()))?)
}


pub fn ensure_parent_dir<P: AsRef<Path>>(p: P) -> anyhow::Result<()> {
if let Some(parent) = p.as_ref().parent().filter(|d| !d.as_os_str().is_empty()) {
fs::create_dir_all(parent).with_context(|| format!("create directory {:?}", parent))?;
}
Ok(())
}
