use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use file_finder::application::{Config, SearchSession, SearchState, SettingsStore};
use file_finder::infrastructure::{ErrorLogger, Logger, LoggerTrait};
use file_finder::presentation::{
    print_folders, print_notification, print_results, Console, ProgressView, SearchSummary,
};

/// 按文件名查找文件的命令行工具
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// 配置文件路径 (默认为程序所在目录下的 config.toml)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// 设置文件路径 (默认为程序所在目录下的 settings.json)
    #[clap(long, global = true)]
    settings: Option<PathBuf>,

    /// 启用详细日志记录，日志文件将保存到当前目录下
    #[clap(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 交互模式 (默认)
    Interactive,
    /// 在所有搜索文件夹中查找文件名包含指定内容的文件
    Search {
        /// 文件名的一部分 (不区分大小写)
        query: String,

        /// 用默认程序打开第 N 个结果
        #[clap(long, value_name = "N", conflicts_with_all = ["reveal", "copy"])]
        open: Option<usize>,

        /// 打开第 N 个结果所在的位置
        #[clap(long, value_name = "N", conflicts_with = "copy")]
        reveal: Option<usize>,

        /// 把第 N 个结果的路径复制到剪贴板
        #[clap(long, value_name = "N")]
        copy: Option<usize>,
    },
    /// 添加搜索文件夹
    Add {
        dir: PathBuf,
    },
    /// 移除搜索文件夹
    Remove {
        dir: PathBuf,
    },
    /// 列出搜索文件夹
    Folders,
}

/// 等待后台事件的间隔
const SEARCH_POLL: Duration = Duration::from_millis(100);

fn run_search(
    session: &mut SearchSession,
    config: &Config,
    query: &str,
    action: Option<(&str, usize)>,
) -> Result<()> {
    if session.folders().is_empty() {
        println!("尚未添加搜索文件夹, 使用 add <目录> 添加");
    }

    if session.start_search(query)?.is_none() {
        anyhow::bail!("搜索内容不能为空");
    }

    println!("🔄 Searching...");
    let mut progress = ProgressView::new();
    // 后台线程退出时会话转为失败状态，循环随之结束
    while session.state().is_searching() {
        if let Some(event) = session.wait_event(SEARCH_POLL) {
            progress.update(&event);
        }
    }
    progress.clear();

    match session.state() {
        SearchState::Finished { .. } => {
            print_results(session.results(), &config.display)?;
            if let Some(summary) = SearchSummary::from_state(session.state(), session.results().len()) {
                summary.print()?;
            }
        }
        SearchState::Failed { message, .. } => anyhow::bail!("搜索失败: {}", message),
        _ => return Ok(()),
    }

    let Some((name, number)) = action else {
        return Ok(());
    };

    // 编号从1开始
    let index = number.checked_sub(1).context("结果编号从 1 开始")?;
    let outcome = match name {
        "open" => session.open_result(index),
        "reveal" => session.reveal_result(index),
        _ => session.copy_result(index),
    };

    match outcome {
        Ok(path) => println!("{}: {}", name, path.display()),
        Err(err) => print_notification("错误", &err),
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start_time = Instant::now();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let config = Config::load_or_create(&config_path)?;

    let settings_path = match &args.settings {
        Some(path) => path.clone(),
        None => file_finder::Settings::default_settings_path()?,
    };

    // 文件夹管理不需要后台线程
    match &args.command {
        Some(Commands::Add { dir }) => {
            let mut store = SettingsStore::open(&settings_path)?;
            if !store.add_folder(dir)? {
                println!("已在列表中: {}", dir.display());
            }
            return print_folders(store.folders());
        }
        Some(Commands::Remove { dir }) => {
            let mut store = SettingsStore::open(&settings_path)?;
            if !store.remove_folder(dir)? {
                println!("不在列表中: {}", dir.display());
            }
            return print_folders(store.folders());
        }
        Some(Commands::Folders) => {
            let store = SettingsStore::open(&settings_path)?;
            return print_folders(store.folders());
        }
        _ => {}
    }

    // 初始化日志记录器
    let logger = Logger::new(args.log)?;
    if logger.is_enabled() {
        println!("日志文件已创建: {}", logger.log_path().display());
        logger.log_message(&format!("配置文件: {}", config_path.display()))?;
        logger.log_message(&format!("设置文件: {}", settings_path.display()))?;
    }
    let logger: Arc<dyn LoggerTrait> = Arc::new(logger);
    let error_logger = Arc::new(ErrorLogger::new(args.log)?);

    let mut session = SearchSession::from_config(
        &config,
        &settings_path,
        Arc::clone(&logger),
        Arc::clone(&error_logger),
    )?;

    let result = match args.command {
        Some(Commands::Search {
            query,
            open,
            reveal,
            copy,
        }) => {
            let action = open
                .map(|n| ("open", n))
                .or(reveal.map(|n| ("reveal", n)))
                .or(copy.map(|n| ("copy", n)));
            run_search(&mut session, &config, &query, action)
        }
        _ => {
            let mut console = Console::new(session, config.display.clone());
            let result = console.run();
            session = console.into_session();
            result
        }
    };

    // 完成日志记录
    logger.finalize(session.searches(), session.results().len() as u64, start_time.elapsed())?;
    error_logger.finalize()?;
    error_logger.print_error_summary();

    result
}
