//! `maf gen …` — documentation generation.

use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::Command;

/// Write one man page per command into `dir`.
pub fn man(root: &Command, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    render_man(root, "maf", dir)
}

fn render_man(cmd: &Command, stem: &str, dir: &Path) -> anyhow::Result<()> {
    let page = clap_mangen::Man::new(cmd.clone());
    let mut buffer = Vec::new();
    page.render(&mut buffer)
        .with_context(|| format!("failed to render man page for {stem}"))?;

    let path = dir.join(format!("{stem}.1"));
    fs::write(&path, buffer).with_context(|| format!("failed to write {}", path.display()))?;

    for sub in cmd.get_subcommands() {
        if sub.is_hide_set() {
            continue;
        }
        render_man(sub, &format!("{stem}-{}", sub.get_name()), dir)?;
    }

    Ok(())
}

/// Write one markdown help file per command into `dir`.
pub fn doc(root: &mut Command, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    render_doc(root, "maf", dir)
}

fn render_doc(cmd: &mut Command, stem: &str, dir: &Path) -> anyhow::Result<()> {
    let help = cmd.render_long_help();
    let content = format!("# {}\n\n```\n{}\n```\n", stem.replace('-', " "), help);

    let path = dir.join(format!("{stem}.md"));
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;

    let names: Vec<String> = cmd
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set())
        .map(|sub| sub.get_name().to_string())
        .collect();

    for name in names {
        let Some(sub) = cmd.find_subcommand_mut(&name) else {
            continue;
        };
        let mut sub = sub.clone();
        render_doc(&mut sub, &format!("{stem}-{name}"), dir)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn man_pages_cover_the_command_tree() {
        let dir = tempfile::tempdir().unwrap();
        man(&crate::Cli::command(), dir.path()).unwrap();

        assert!(dir.path().join("maf.1").exists());
        assert!(dir.path().join("maf-server.1").exists());
        assert!(dir.path().join("maf-version.1").exists());
    }

    #[test]
    fn markdown_docs_cover_the_command_tree() {
        let dir = tempfile::tempdir().unwrap();
        doc(&mut crate::Cli::command(), dir.path()).unwrap();

        assert!(dir.path().join("maf.md").exists());
        assert!(dir.path().join("maf-server.md").exists());
        assert!(dir.path().join("maf-gen.md").exists());
    }
}
