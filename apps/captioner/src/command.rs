use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "bmp", "gif", "tiff"];

pub const HELP: &str = "\
commands:
  select <path>...   caption the given images, directories are expanded
  next | prev        move through the selection
  show               show the current image and its caption
  export             write a .txt caption next to every image
  device <name>      run the model on cpu, cuda or metal
  status             model and progress status
  help               this message
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(Vec<PathBuf>),
    Next,
    Prev,
    Show,
    Export,
    Device(String),
    Status,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}, try `help`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

impl Command {
    /// Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "" => return Ok(None),
            "select" | "open" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("select"));
                }
                Command::Select(rest.split_whitespace().map(PathBuf::from).collect())
            }
            "next" | "n" => Command::Next,
            "prev" | "p" => Command::Prev,
            "show" => Command::Show,
            "export" => Command::Export,
            "device" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("device"));
                }
                Command::Device(rest.to_string())
            }
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(CommandError::Unknown(name.to_string())),
        };

        Ok(Some(command))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|v| v.to_str())
        .map(|v| IMAGE_EXTENSIONS.contains(&v.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Files are kept as given, directories are replaced by the images directly inside them.
pub fn expand_selection(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut images = vec![];

    for path in paths {
        if path.is_dir() {
            let mut entries = std::fs::read_dir(path)?
                .filter_map(|v| v.ok().map(|v| v.path()))
                .filter(|v| v.is_file() && is_image(v))
                .collect::<Vec<_>>();
            entries.sort();
            images.extend(entries);
        } else {
            images.push(path.clone());
        }
    }

    Ok(images)
}

#[cfg(test)]
mod test {
    use super::{expand_selection, Command, CommandError};
    use std::path::PathBuf;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(Command::parse("NEXT"), Ok(Some(Command::Next)));
        assert_eq!(Command::parse("p"), Ok(Some(Command::Prev)));
        assert_eq!(
            Command::parse("select a.png  dir/b.jpg"),
            Ok(Some(Command::Select(vec![
                PathBuf::from("a.png"),
                PathBuf::from("dir/b.jpg")
            ])))
        );
        assert_eq!(
            Command::parse("device metal"),
            Ok(Some(Command::Device("metal".into())))
        );
        assert_eq!(
            Command::parse("select"),
            Err(CommandError::MissingArgument("select"))
        );
        assert_eq!(
            Command::parse("caption it"),
            Err(CommandError::Unknown("caption".into()))
        );
    }

    #[test]
    fn test_expand_selection() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let single = PathBuf::from("elsewhere/c.webp");
        let images =
            expand_selection(&[dir.path().to_path_buf(), single.clone()]).unwrap();

        assert_eq!(
            images,
            vec![dir.path().join("a.jpg"), dir.path().join("b.PNG"), single]
        );
    }
}
