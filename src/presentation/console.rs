use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{select, unbounded};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::config::DisplayConfig;
use crate::application::{SearchEvent, SearchSession, SearchState};
use crate::presentation::display::{
    print_folders, print_notification, print_results, progress_message, short_name, state_line,
    SearchSummary,
};

/// 交互模式下的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Cancel,
    Add(PathBuf),
    RemoveIndex(usize),
    RemovePath(PathBuf),
    Folders,
    Open(usize),
    Reveal(usize),
    Copy(usize),
    Results,
    Help,
    Quit,
    Empty,
}

/// 解析编号参数（用户看到的编号从1开始，返回从0开始的索引）
fn parse_index(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("无效的编号: {}", arg.trim())),
    }
}

fn require_arg<'a>(name: &str, arg: &'a str) -> Result<&'a str, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(format!("{} 需要一个参数", name))
    } else {
        Ok(arg)
    }
}

/// 解析输入行，不认识的输入当作搜索内容
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head {
        "find" | "search" => Command::Search(require_arg(head, rest)?.to_string()),
        "cancel" if rest.is_empty() => Command::Cancel,
        "add" => Command::Add(PathBuf::from(require_arg(head, rest)?)),
        "remove" | "rm" => {
            let arg = require_arg(head, rest)?;
            match parse_index(arg) {
                Ok(index) => Command::RemoveIndex(index),
                Err(_) => Command::RemovePath(PathBuf::from(arg)),
            }
        }
        "folders" if rest.is_empty() => Command::Folders,
        "open" => Command::Open(parse_index(require_arg(head, rest)?)?),
        "reveal" => Command::Reveal(parse_index(require_arg(head, rest)?)?),
        "copy" => Command::Copy(parse_index(require_arg(head, rest)?)?),
        "results" if rest.is_empty() => Command::Results,
        "help" | "?" if rest.is_empty() => Command::Help,
        "quit" | "exit" | "q" if rest.is_empty() => Command::Quit,
        _ => Command::Search(line.to_string()),
    };

    Ok(command)
}

const HELP: &str = "\
命令:
  <文字> | find <文字>   按文件名搜索 (不区分大小写)
  cancel                 取消正在进行的搜索
  add <目录>             添加搜索文件夹
  remove <编号|目录>     移除搜索文件夹
  folders                列出搜索文件夹
  results                重新显示结果
  open <编号>            用默认程序打开文件
  reveal <编号>          打开文件所在位置
  copy <编号>            复制文件路径
  help                   显示帮助
  quit                   退出";

/// 根据后台事件驱动的进度条
pub struct ProgressView {
    bar: Option<ProgressBar>,
}

impl ProgressView {
    pub fn new() -> Self {
        Self { bar: None }
    }

    pub fn update(&mut self, event: &SearchEvent) {
        match event {
            SearchEvent::Started { total, .. } => {
                self.clear();
                let bar = match total {
                    Some(total) => {
                        let bar = ProgressBar::new(*total);
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
                                .unwrap_or_else(|_| ProgressStyle::default_bar()),
                        );
                        bar
                    }
                    None => {
                        let bar = ProgressBar::new_spinner();
                        bar.set_style(
                            ProgressStyle::default_spinner()
                                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                        );
                        bar
                    }
                };
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_message(progress_message(0, *total));
                self.bar = Some(bar);
            }
            SearchEvent::Progress { scanned, total, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(*scanned);
                    bar.set_message(progress_message(*scanned, *total));
                }
            }
            _ => self.clear(),
        }
    }

    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

/// 交互式控制台
///
/// 标准输入在单独的线程中读取，前台循环同时等待输入行和后台事件，
/// 因此扫描过程中仍然可以输入 `cancel` 或新的搜索内容。
pub struct Console {
    session: SearchSession,
    display: DisplayConfig,
    progress: ProgressView,
}

impl Console {
    pub fn new(session: SearchSession, display: DisplayConfig) -> Self {
        Self {
            session,
            display,
            progress: ProgressView::new(),
        }
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn into_session(self) -> SearchSession {
        self.session
    }

    pub fn run(&mut self) -> Result<()> {
        let (line_tx, line_rx) = unbounded::<String>();
        thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        let events = self.session.events();

        println!("🔍 FileFinder - 输入 help 查看命令");
        print_folders(self.session.folders())?;
        self.prompt();

        loop {
            select! {
                recv(line_rx) -> line => {
                    let Ok(line) = line else { break };
                    if !self.handle_line(&line)? {
                        break;
                    }
                    if !self.session.state().is_searching() {
                        self.prompt();
                    }
                }
                recv(events) -> event => {
                    let Ok(event) = event else { break };
                    if self.session.apply_event(&event) {
                        self.render_event(&event)?;
                    }
                }
            }
        }

        self.progress.clear();
        self.session.cancel();
        Ok(())
    }

    fn prompt(&self) {
        print!("> ");
        let _ = io::stdout().flush();
    }

    /// 处理一行输入，返回 `false` 表示退出
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                return Ok(true);
            }
        };

        match command {
            Command::Empty => {}
            Command::Quit => return Ok(false),
            Command::Help => println!("{}", HELP),
            Command::Search(text) => match self.session.start_search(&text) {
                Ok(Some(_)) => {
                    self.progress.clear();
                    println!("{}", state_line(self.session.state()));
                }
                Ok(None) => {}
                Err(err) => print_notification("搜索失败", &err),
            },
            Command::Cancel => {
                if !self.session.cancel() {
                    println!("当前没有进行中的搜索");
                }
            }
            Command::Add(folder) => match self.session.add_folder(&folder) {
                Ok(true) => print_folders(self.session.folders())?,
                Ok(false) => println!("已在列表中: {}", folder.display()),
                Err(err) => print_notification("无法添加文件夹", &err),
            },
            Command::RemoveIndex(index) => match self.session.remove_folder_at(index) {
                Ok(_) => print_folders(self.session.folders())?,
                Err(err) => print_notification("无法移除文件夹", &err),
            },
            Command::RemovePath(folder) => match self.session.remove_folder(&folder) {
                Ok(true) => print_folders(self.session.folders())?,
                Ok(false) => println!("不在列表中: {}", folder.display()),
                Err(err) => print_notification("无法移除文件夹", &err),
            },
            Command::Folders => print_folders(self.session.folders())?,
            Command::Results => self.show_results()?,
            Command::Open(index) => match self.session.open_result(index) {
                Ok(path) => println!("已打开: {}", short_name(&path)),
                Err(err) => print_notification("错误", &err),
            },
            Command::Reveal(index) => match self.session.reveal_result(index) {
                Ok(path) => println!("已打开所在位置: {}", short_name(&path)),
                Err(err) => print_notification("错误", &err),
            },
            Command::Copy(index) => match self.session.copy_result(index) {
                Ok(path) => println!("📋 已复制: {}", path.display()),
                Err(err) => print_notification("错误", &err),
            },
        }

        Ok(true)
    }

    fn show_results(&self) -> Result<()> {
        match self.session.state() {
            SearchState::Finished { .. } => print_results(self.session.results(), &self.display),
            state => {
                println!("{}", state_line(state));
                Ok(())
            }
        }
    }

    fn render_event(&mut self, event: &SearchEvent) -> Result<()> {
        self.progress.update(event);
        if !event.is_terminal() {
            return Ok(());
        }

        match self.session.state() {
            SearchState::Finished { .. } => {
                print_results(self.session.results(), &self.display)?;
                if let Some(summary) =
                    SearchSummary::from_state(self.session.state(), self.session.results().len())
                {
                    summary.print()?;
                }
            }
            SearchState::Failed { message, .. } => {
                print_notification("搜索失败", &anyhow::anyhow!(message.clone()));
            }
            state => println!("{}", state_line(state)),
        }

        self.prompt();
        Ok(())
    }
}
