use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lua_fsm_sync::io::{
    DefaultScriptReader, DefaultScriptWriter, JsonSessionReader, JsonSessionWriter, RawScript,
    ScriptReader, ScriptWriter, SessionReader, SessionWriter,
};
use lua_fsm_sync::{
    generate_document, Entity, EntityRef, FieldShape, FieldValue, Fsm, FsmEditor, ImportReport,
    State, Trigger, SUPPORTED_EXTENSIONS,
};

#[derive(Parser)]
#[command(name = "lua_fsm_sync")]
#[command(about = "在状态机模型与带注解的 Lua 脚本之间双向同步")]
#[command(version)]
struct Cli {
    /// 输入 Lua 脚本或编辑器会话（.json）路径
    #[arg(short, long)]
    input: PathBuf,

    /// 输出 Lua 脚本路径（默认写回链接文件）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 显示状态机统计信息
    #[arg(long)]
    stats: bool,

    /// 用模型重新生成整个脚本（丢弃手写内容）
    #[arg(long)]
    regenerate: bool,

    /// 导出编辑器会话到 JSON 文件
    #[arg(long)]
    export_session: Option<PathBuf>,

    /// 重命名状态，格式 OLD=NEW（可重复）
    #[arg(long, value_name = "OLD=NEW")]
    rename_state: Vec<String>,

    /// 重命名触发器，格式 OLD=NEW（可重复）
    #[arg(long, value_name = "OLD=NEW")]
    rename_trigger: Vec<String>,

    /// 修改字段，格式 ID.FIELD=VALUE（可重复）
    #[arg(long, value_name = "ID.FIELD=VALUE")]
    set_field: Vec<String>,

    /// 写回前创建时间戳备份
    #[arg(long)]
    backup: bool,

    /// 静默模式(仅输出错误)
    #[arg(long)]
    quiet: bool,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    validate_input(&cli.input)?;

    let mut editor = open_editor(&cli)?;

    handle_renames(&cli, &mut editor)?;
    handle_field_updates(&cli, &mut editor)?;

    if cli.regenerate {
        editor.regenerate();
        if !cli.quiet {
            println!("已重新生成脚本");
        }
    }

    if cli.stats {
        print_stats(editor.fsm());
    }

    if let Some(session_path) = &cli.export_session {
        JsonSessionWriter
            .write_session(editor.fsm(), session_path)
            .with_context(|| format!("无法写入会话: {:?}", session_path))?;
        if !cli.quiet {
            println!("会话已导出到: {:?}", session_path);
        }
    }

    handle_output(&cli, &mut editor)
}

/// 安装日志订阅器：RUST_LOG 优先，其次 --quiet / --verbose
fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// 验证输入文件
fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("输入文件不存在: {:?}", input);
    }

    let extension = extension_of(input);
    let supported = SUPPORTED_EXTENSIONS
        .iter()
        .any(|&ext| Some(ext) == extension.as_deref());
    if !supported && !is_session(input) {
        bail!("输入文件必须是 Lua 脚本或 JSON 会话");
    }

    Ok(())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn is_session(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("json")
}

/// 打开脚本或会话，返回编辑器
fn open_editor(cli: &Cli) -> Result<FsmEditor> {
    if !is_session(&cli.input) {
        let (editor, report) = FsmEditor::open(&cli.input, &DefaultScriptReader)
            .with_context(|| format!("无法加载脚本: {:?}", cli.input))?;
        print_report(cli, &report);
        return Ok(editor);
    }

    let fsm = JsonSessionReader
        .read_session(&cli.input)
        .with_context(|| format!("无法加载会话: {:?}", cli.input))?;
    let linked = fsm.linked_file().map(Path::to_path_buf);
    let mut editor = FsmEditor::new(fsm);

    if let Some(path) = linked.filter(|p| p.exists()) {
        let raw = DefaultScriptReader
            .read(&path)
            .with_context(|| format!("无法读取链接脚本: {:?}", path))?;
        let report = editor.link(path, raw.text);
        print_report(cli, &report);
    }

    Ok(editor)
}

fn print_report(cli: &Cli, report: &ImportReport) {
    for issue in &report.issues {
        tracing::warn!("{}", issue);
    }
    for entity in &report.unknown_entities {
        tracing::warn!("文件中存在未知实体: {}", entity);
    }
    if !cli.quiet {
        println!("导入: {}", report.summary());
    }
}

/// 解析 `KEY=VALUE` 形式的参数
fn split_assignment(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .with_context(|| format!("参数格式错误，应为 KEY=VALUE: {}", arg))
}

fn handle_renames(cli: &Cli, editor: &mut FsmEditor) -> Result<()> {
    for arg in &cli.rename_state {
        let (old_id, new_id) = split_assignment(arg)?;
        editor
            .rename(&EntityRef::State(old_id.to_string()), new_id)
            .with_context(|| format!("无法重命名状态 {}", old_id))?;
        if !cli.quiet {
            println!("状态重命名: {} -> {}", old_id, new_id);
        }
    }

    for arg in &cli.rename_trigger {
        let (old_id, new_id) = split_assignment(arg)?;
        editor
            .rename(&EntityRef::Trigger(old_id.to_string()), new_id)
            .with_context(|| format!("无法重命名触发器 {}", old_id))?;
        if !cli.quiet {
            println!("触发器重命名: {} -> {}", old_id, new_id);
        }
    }

    Ok(())
}

fn handle_field_updates(cli: &Cli, editor: &mut FsmEditor) -> Result<()> {
    for arg in &cli.set_field {
        let (target, text) = split_assignment(arg)?;
        let (id, field) = target
            .split_once('.')
            .with_context(|| format!("字段格式错误，应为 ID.FIELD: {}", target))?;

        let entity = resolve_entity(editor.fsm(), id)
            .with_context(|| format!("未找到实体: {}", id))?;
        let shape = field_shape(&entity, field)
            .with_context(|| format!("{} 没有字段 {}", entity, field))?;
        let value = parse_value(shape, text)
            .with_context(|| format!("无法解析 {}.{} 的值", id, field))?;

        editor
            .set_field(&entity, field, value)
            .with_context(|| format!("无法修改 {}.{}", id, field))?;
        if !cli.quiet {
            println!("已修改 {}.{}", id, field);
        }
    }
    Ok(())
}

/// 按 ID 查找实体（状态机、状态、触发器）
fn resolve_entity(fsm: &Fsm, id: &str) -> Option<EntityRef> {
    if fsm.id() == id {
        Some(EntityRef::Fsm)
    } else if fsm.state(id).is_some() {
        Some(EntityRef::State(id.to_string()))
    } else if fsm.trigger(id).is_some() {
        Some(EntityRef::Trigger(id.to_string()))
    } else {
        None
    }
}

fn field_shape(entity: &EntityRef, field: &str) -> Option<FieldShape> {
    let spec = match entity {
        EntityRef::Fsm => Fsm::field_spec(field),
        EntityRef::State(_) => State::field_spec(field),
        EntityRef::Trigger(_) => Trigger::field_spec(field),
    };
    spec.map(|spec| spec.shape)
}

/// 将命令行文本解析为字段值
///
/// 表用逗号分隔；映射项写作 `key:value`；参数写作 `name:type`；
/// 函数体中的 `\n` 表示换行。
fn parse_value(shape: FieldShape, text: &str) -> Result<FieldValue> {
    let items = || text.split(',').map(str::trim).filter(|s| !s.is_empty());

    let value = match shape {
        FieldShape::Str => FieldValue::Str(text.to_string()),
        FieldShape::Int => FieldValue::Int(text.trim().parse()?),
        FieldShape::Float => FieldValue::Float(text.trim().parse()?),
        FieldShape::Bool => FieldValue::Bool(text.trim().parse()?),
        FieldShape::NumberTable => FieldValue::Numbers(
            items()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        FieldShape::StrList => FieldValue::List(items().map(str::to_string).collect()),
        FieldShape::StrMap => FieldValue::Map(
            items()
                .map(|item| {
                    item.split_once(':')
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                        .with_context(|| format!("映射项应为 key:value: {}", item))
                })
                .collect::<Result<_>>()?,
        ),
        FieldShape::Signature { .. } => FieldValue::Params(
            items()
                .map(|item| match item.split_once(':') {
                    Some((name, ty)) => (name.trim().to_string(), ty.trim().to_string()),
                    None => (item.to_string(), String::new()),
                })
                .collect(),
        ),
        FieldShape::Function { .. } => FieldValue::Body(text.replace("\\n", "\n")),
    };
    Ok(value)
}

fn print_stats(fsm: &Fsm) {
    println!("状态机统计信息:");
    println!("  ID: {}", fsm.id());
    println!("  名称: {}", fsm.name);
    println!("  初始状态: {}", fsm.initial_state_id().unwrap_or("(无)"));
    println!("  状态数: {}", fsm.state_count());
    println!("  触发器数: {}", fsm.trigger_count());

    for state in fsm.states() {
        let triggers: Vec<&str> = fsm.triggers_of(state.id()).map(|t| t.id()).collect();
        println!("    {} [{}]", state.id(), triggers.join(", "));
    }

    let dangling = fsm.dangling_references();
    if !dangling.is_empty() {
        println!("  失效引用: {}", dangling.len());
        for issue in dangling {
            println!("    {}", issue);
        }
    }
}

/// 写出结果：指定 --output 时写到该路径，否则有修改时写回链接文件
fn handle_output(cli: &Cli, editor: &mut FsmEditor) -> Result<()> {
    if let Some(output) = &cli.output {
        let text = editor
            .script()
            .map(str::to_string)
            .unwrap_or_else(|| generate_document(editor.fsm()));
        DefaultScriptWriter
            .write(&RawScript { text }, output)
            .with_context(|| format!("无法写入输出文件: {:?}", output))?;
        if !cli.quiet {
            println!("输出文件: {:?}", output);
        }
        return Ok(());
    }

    if !editor.is_modified() {
        return Ok(());
    }
    if !editor.fsm().is_file_backed() {
        if !cli.quiet {
            println!("模型未链接脚本，未写入任何文件（使用 --output 指定路径）");
        }
        return Ok(());
    }

    let backup = editor.save(&DefaultScriptWriter, cli.backup)?;
    if !cli.quiet {
        if let Some(backup) = backup {
            println!("备份文件: {:?}", backup);
        }
        println!("{}", editor.summary());
    }
    Ok(())
}
