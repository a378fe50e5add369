//! Renders `unimux.1` and one `unimux-<verb>.1` per visible subcommand into
//! `$OUT_DIR/man`. Packagers pick the pages up from there.

use std::error::Error;
use std::path::Path;
use std::{env, fs};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

// cli.rs needs nothing beyond clap and clap_complete.
#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir = env::var_os("OUT_DIR").ok_or("OUT_DIR is unset")?;
    let man_dir = Path::new(&out_dir).join("man");
    fs::create_dir_all(&man_dir)?;

    let root = cli::Cli::command();
    let mut pending = vec![(root.get_name().to_owned(), root)];

    while let Some((page, cmd)) = pending.pop() {
        let children: Vec<_> = cmd
            .get_subcommands()
            .filter(|sub| !sub.is_hide_set())
            .map(|sub| {
                let name = format!("{page}-{}", sub.get_name());
                (name.clone(), sub.clone().name(name))
            })
            .collect();
        pending.extend(children);

        write_page(&cmd, &man_dir.join(format!("{page}.1")))?;
    }
    Ok(())
}

fn write_page(cmd: &Command, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut roff = Vec::new();
    Man::new(cmd.clone()).render(&mut roff)?;
    fs::write(path, roff).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(())
}
