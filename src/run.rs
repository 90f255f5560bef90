use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use nbproc::processors::frontmatter::InferFrontmatter;
use nbproc::{Pipeline, ProcessorContext};
use nbproc_parser::Notebook;
use tracing::info;

pub fn read_notebook(path: &Path) -> anyhow::Result<Notebook> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    serde_json::from_str(&input).with_context(|| format!("{} is not a notebook", path.display()))
}

pub fn write_notebook<W: Write>(nb: &Notebook, mut writer: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut writer, nb)?;
    writeln!(writer)?;
    Ok(())
}

/// Runs `pipeline` over the notebook at `input`. The result goes to `output`, or to stdout.
pub fn process_file(
    input: &Path,
    output: Option<&Path>,
    pipeline: &Pipeline,
    ctx: &ProcessorContext,
) -> anyhow::Result<()> {
    let mut nb = read_notebook(input)?;
    pipeline
        .run(&mut nb, ctx)
        .with_context(|| format!("processing {} failed", input.display()))?;

    match output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("could not create {}", path.display()))?;
            write_notebook(&nb, file)?;
            info!("wrote {}", path.display());
        }
        None => write_notebook(&nb, std::io::stdout().lock())?,
    }
    Ok(())
}

/// The front matter block that processing would add to the notebook at `input`.
pub fn preview_frontmatter(input: &Path) -> anyhow::Result<Option<String>> {
    let nb = read_notebook(input)?;
    Ok(InferFrontmatter::default().infer(&nb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbproc_parser::Cell;

    fn save(dir: &Path, nb: &Notebook) -> std::path::PathBuf {
        let path = dir.join("index.ipynb");
        write_notebook(nb, fs::File::create(&path).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_process_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = save(
            dir.path(),
            &Notebook::new(vec![
                Cell::markdown("# Index\n> Start here"),
                Cell::code("#| hide\nimport os"),
                Cell::code("1 + 1"),
            ]),
        );
        let output = dir.path().join("out.ipynb");

        process_file(
            &input,
            Some(&output),
            &Pipeline::default(),
            &ProcessorContext::default(),
        )
        .unwrap();

        let nb = read_notebook(&output).unwrap();
        let sources: Vec<&str> = nb.cells.iter().filter_map(Cell::source).collect();
        assert_eq!(
            sources,
            vec![
                "---\ntitle: Index\ndescription: Start here\n---",
                nbproc::processors::filters::WARNING,
                "1 + 1",
            ]
        );
    }

    #[test]
    fn test_preview_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let input = save(dir.path(), &Notebook::new(vec![Cell::markdown("# Index")]));
        assert_eq!(
            preview_frontmatter(&input).unwrap().as_deref(),
            Some("---\ntitle: Index\n---")
        );

        let input = save(dir.path(), &Notebook::new(vec![Cell::markdown("text")]));
        assert_eq!(preview_frontmatter(&input).unwrap(), None);
    }

    #[test]
    fn test_not_a_notebook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ipynb");
        fs::write(&path, "{}").unwrap();
        let err = read_notebook(&path).unwrap_err();
        assert!(err.to_string().contains("is not a notebook"));
    }
}
