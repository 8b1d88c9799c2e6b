use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use threat_query::sql_compiler::SqlCompiler;
use threat_query::suggest::suggest_with;
use threat_query::validate::validate_with;
use threat_query::{parse_query_with, QueryConfig};

/// Interactive console for the dashboard search query language.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Entity type queries are resolved against
    #[arg(long, default_value = "iocs")]
    entity: String,

    /// JSON field schema replacing the built-in one
    #[arg(long)]
    schema: Option<PathBuf>,

    /// JSON entity type -> table name mapping
    #[arg(long)]
    tables: Option<PathBuf>,
}

const HELP: &str = "\
<query>              parse a query and print its conditions
:entity <type>       switch entity type
:validate <query>    validate a query for the current entity type
:suggest <partial>   autocomplete a partial token
:sql <query>         compile a query to SQL
:help                show this help
:quit                exit";

struct Console {
    config: QueryConfig,
    entity: String,
}

impl Console {
    /// 处理一行输入，返回 `false` 表示退出
    fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, rest) = match line.strip_prefix(':') {
            Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
            None => return self.parse(line).map(|_| true),
        };

        match command {
            "quit" | "q" => return Ok(false),
            "help" => println!("{}", HELP),
            "entity" => self.switch_entity(rest.trim()),
            "validate" => {
                let result = validate_with(&self.config.registry, rest, &self.entity);
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            "suggest" => {
                for suggestion in suggest_with(&self.config.registry, &self.entity, rest) {
                    println!("  {}", suggestion.text);
                }
            }
            "sql" => {
                let conditions = parse_query_with(&self.config.registry, rest, Some(&self.entity))
                    .unwrap_or_default();
                match SqlCompiler::from_config(&self.config).compile(&conditions, &self.entity) {
                    Ok(result) => {
                        println!("{}", result.sql);
                        for opt in &result.optimizations {
                            println!("  • {:?}", opt);
                        }
                    }
                    Err(e) => println!("✗ {}", e),
                }
            }
            other => println!("unknown command :{} (try :help)", other),
        }
        Ok(true)
    }

    /// 解析查询并以JSON打印条件列表
    fn parse(&self, query: &str) -> Result<()> {
        match parse_query_with(&self.config.registry, query, Some(&self.entity)) {
            Some(conditions) => println!("{}", serde_json::to_string_pretty(&conditions)?),
            None => println!("null (matches everything)"),
        }
        Ok(())
    }

    fn switch_entity(&mut self, entity: &str) {
        if self.config.registry.entity(entity).is_some() {
            self.entity = entity.to_string();
            println!("entity type: {}", self.entity);
        } else {
            let known: Vec<_> = self.config.registry.entity_types().collect();
            println!("unknown entity type '{}', known: {}", entity, known.join(", "));
        }
    }
}

fn main() -> Result<()> {
    // 初始化日志，默认只输出warn级别
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = QueryConfig::load(args.schema.as_deref(), args.tables.as_deref());
    let entity = config
        .registry
        .entity_types()
        .next()
        .unwrap_or_default()
        .to_string();
    // 先使用第一个实体类型，再切换到命令行指定的实体
    let mut console = Console { config, entity };
    console.switch_entity(&args.entity);

    let mut editor = DefaultEditor::new().context("cannot initialise line editor")?;
    println!("--- threat query console (:help for commands) ---");

    loop {
        let prompt = format!("{}> ", console.entity);
        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if !console.handle(line)? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break, // Ctrl-C / Ctrl-D
            Err(e) => return Err(e).context("cannot read input"),
        }
    }

    Ok(())
}
