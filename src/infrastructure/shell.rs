use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("无法启动 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} 执行失败 ({status})")]
    Status { program: String, status: String },

    #[error("无法写入剪贴板: {0}")]
    ClipboardWrite(#[source] std::io::Error),

    #[error("未找到可用的剪贴板工具, 请安装 wl-copy, xclip 或 xsel 之一")]
    NoClipboardTool,

    #[error("路径没有上级目录: {0}")]
    NoParent(String),
}

/// 与操作系统交互的操作：打开文件、在文件管理器中显示、复制到剪贴板
pub trait ShellActions: Send + Sync {
    fn open_path(&self, path: &Path) -> Result<(), ShellError>;
    fn reveal_path(&self, path: &Path) -> Result<(), ShellError>;
    fn copy_text(&self, text: &str) -> Result<(), ShellError>;
}

/// 调用平台默认程序的实现
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

#[cfg(any(not(target_os = "windows"), test))]
fn run(program: &str, args: &[&std::ffi::OsStr]) -> Result<(), ShellError> {
    let mut command = Command::new(program);
    command.args(args);
    run_command(program, &mut command)
}

fn run_command(program: &str, command: &mut Command) -> Result<(), ShellError> {
    let status = command
        .status()
        .map_err(|source| ShellError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ShellError::Status {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

/// cmd 会解释路径中的 `&` `^` 等字符，放在引号里原样传递
#[cfg(any(target_os = "windows", test))]
fn quote_for_cmd(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

// explorer 即使成功也可能返回非零退出码，因此只检查能否启动
#[cfg(target_os = "windows")]
fn spawn_detached(program: &str, args: &[&std::ffi::OsStr]) -> Result<(), ShellError> {
    Command::new(program)
        .args(args)
        .spawn()
        .map(|_| ())
        .map_err(|source| ShellError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn copy_with_command(program: &str, args: &[&str], text: &str) -> Result<(), ShellError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|source| ShellError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(ShellError::ClipboardWrite)?;
    }

    let status = child.wait().map_err(ShellError::ClipboardWrite)?;
    if status.success() {
        Ok(())
    } else {
        Err(ShellError::Status {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

#[cfg(target_os = "windows")]
impl ShellActions for SystemShell {
    fn open_path(&self, path: &Path) -> Result<(), ShellError> {
        use std::os::windows::process::CommandExt;

        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).raw_arg(quote_for_cmd(path));
        run_command("cmd", &mut command)
    }

    fn reveal_path(&self, path: &Path) -> Result<(), ShellError> {
        let mut select = std::ffi::OsString::from("/select,");
        select.push(path.as_os_str());
        spawn_detached("explorer", &[select.as_os_str()])
    }

    fn copy_text(&self, text: &str) -> Result<(), ShellError> {
        copy_with_command("cmd", &["/C", "clip"], text)
    }
}

#[cfg(target_os = "macos")]
impl ShellActions for SystemShell {
    fn open_path(&self, path: &Path) -> Result<(), ShellError> {
        run("open", &[path.as_os_str()])
    }

    fn reveal_path(&self, path: &Path) -> Result<(), ShellError> {
        run("open", &[std::ffi::OsStr::new("-R"), path.as_os_str()])
    }

    fn copy_text(&self, text: &str) -> Result<(), ShellError> {
        copy_with_command("pbcopy", &[], text)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
impl ShellActions for SystemShell {
    fn open_path(&self, path: &Path) -> Result<(), ShellError> {
        run("xdg-open", &[path.as_os_str()])
    }

    /// xdg-open 无法选中文件，只能打开所在目录
    fn reveal_path(&self, path: &Path) -> Result<(), ShellError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ShellError::NoParent(path.display().to_string()))?;
        run("xdg-open", &[parent.as_os_str()])
    }

    fn copy_text(&self, text: &str) -> Result<(), ShellError> {
        let tools: [(&str, &[&str]); 3] = [
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ];

        for (program, args) in tools {
            match copy_with_command(program, args, text) {
                Ok(()) => return Ok(()),
                // 工具不存在时尝试下一个
                Err(ShellError::Spawn { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(ShellError::NoClipboardTool)
    }
}
