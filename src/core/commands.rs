//! Slash 命令
//!
//! 以 `/` 开头的输入是命令；`/<agent>` 切换到该 agent 并播放开场白。空行输出一行帮助。

use std::sync::OnceLock;

use regex::Regex;

use crate::core::{Orchestrator, TurnEvent};

pub const ONELINE_HELP: &str =
    "System Slashes: /bye, /new, /prompt, /sample, /help, /history, /functions, /llm, /switch, /verbose";

const COMMAND_HELP: &[(&str, &str)] = &[
    ("/bye", "Terminate the app"),
    ("/new", "Start a new session with the current agent"),
    ("/prompt", "Display the current system prompt"),
    ("/sample[N]", "Make the sample (or sampleN) request of this agent"),
    ("/sample <agent>", "Make the sample request of another agent"),
    ("/history", "Display the conversation history"),
    ("/functions", "Display the function definitions"),
    ("/llm [model]", "List models or switch the model of this session"),
    ("/switch [set]", "List manifest sets or switch to one"),
    ("/verbose", "Toggle verbose mode"),
    ("/help [agent]", "Display this help or describe an agent"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help(Option<String>),
    Bye,
    Verbose,
    Prompt,
    History,
    Functions,
    New,
    Llm(Option<String>),
    /// `/sample`、`/sample2`…：key 为 manifest 中的条目名；`/sample <agent>` 取其他 agent 的 sample
    Sample { key: String, agent: Option<String> },
    /// `/switch <set>`：切换 manifest 组
    SwitchSet(Option<String>),
    /// `/<key>`：切换 agent（是否存在由执行时判断）
    Switch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command(SlashCommand),
    Message(String),
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/(\S+)(?:\s+(.*))?$").unwrap_or_else(|e| panic!("slash regex: {e}"))
    })
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(caps) = slash_re().captures(line) else {
        return Input::Message(line.to_string());
    };
    let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let arg = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let command = match key {
        "help" => SlashCommand::Help(arg),
        "bye" => SlashCommand::Bye,
        "verbose" => SlashCommand::Verbose,
        "prompt" => SlashCommand::Prompt,
        "history" => SlashCommand::History,
        "functions" => SlashCommand::Functions,
        "new" => SlashCommand::New,
        "llm" => SlashCommand::Llm(arg),
        "switch" => SlashCommand::SwitchSet(arg),
        sample if sample.starts_with("sample") => SlashCommand::Sample {
            key: sample.to_string(),
            agent: arg.filter(|_| sample == "sample"),
        },
        other => SlashCommand::Switch(other.to_string()),
    };
    Input::Command(command)
}

/// 命令执行结果：要打印的文本、（/sample 触发的）对话事件、是否退出
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub lines: Vec<String>,
    pub events: Vec<TurnEvent>,
    pub quit: bool,
}

impl CommandOutput {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Default::default()
        }
    }

    fn line(line: impl Into<String>) -> Self {
        Self::lines(vec![line.into()])
    }
}

pub async fn run_command(orch: &mut Orchestrator, command: SlashCommand) -> CommandOutput {
    match command {
        SlashCommand::Bye => CommandOutput {
            quit: true,
            ..Default::default()
        },
        SlashCommand::Verbose => {
            let on = orch.toggle_verbose();
            CommandOutput::line(format!("Verbose Mode: {on}"))
        }
        SlashCommand::Prompt => match orch.session().history().get(0) {
            Some(first) if first.role == crate::memory::Role::System => {
                CommandOutput::line(first.content.clone())
            }
            _ => CommandOutput::line("(no system prompt)"),
        },
        SlashCommand::History => {
            let json = serde_json::to_string_pretty(orch.session().history().messages())
                .unwrap_or_else(|e| format!("(history unavailable: {e})"));
            CommandOutput::line(json)
        }
        SlashCommand::Functions => match &orch.session().manifest().functions {
            Some(functions) => CommandOutput::line(
                serde_json::to_string_pretty(functions).unwrap_or_else(|e| format!("(invalid functions: {e})")),
            ),
            None => CommandOutput::line("(no functions)"),
        },
        SlashCommand::New => match orch.reset() {
            Ok(()) => CommandOutput::line(format!("Restarted {}", orch.session().agent_key())),
            Err(e) => CommandOutput::line(format!("Failed to restart: {e}")),
        },
        SlashCommand::Llm(None) => {
            let current = orch.session().model().key.clone();
            let lines = orch
                .switcher()
                .catalog()
                .keys()
                .into_iter()
                .map(|k| if k == current { format!("* {k}") } else { format!("  {k}") })
                .collect();
            CommandOutput::lines(lines)
        }
        SlashCommand::Llm(Some(key)) => {
            if orch.set_model(&key) {
                CommandOutput::line(format!("Model = {}", orch.session().model().name()))
            } else {
                CommandOutput::line(format!("Invalid model: {key}"))
            }
        }
        SlashCommand::Sample { key, agent: None } => {
            match orch.session().manifest().sample(&key).map(String::from) {
                Some(sample) => run_sample(orch, sample).await,
                None => CommandOutput::line(format!("Error: No {key} in the manifest file")),
            }
        }
        SlashCommand::Sample { agent: Some(agent), .. } => {
            match orch.switcher().registry().get(&agent) {
                Some(m) => match m.sample("sample").map(String::from) {
                    Some(sample) => run_sample(orch, sample).await,
                    None => CommandOutput::line(format!("Error: No sample in {agent}")),
                },
                None => match orch.session().manifest().agents.as_ref() {
                    Some(agents) => CommandOutput::line(format!("/sample {{agent}}: {}", agents.join(", "))),
                    None => CommandOutput::line(format!("Error: No manifest named '{agent}'")),
                },
            }
        }
        SlashCommand::SwitchSet(Some(name)) if orch.manifest_set_names().contains(&name) => {
            match orch.switch_set(&name) {
                Ok(intro) => activation(orch, intro),
                Err(e) => CommandOutput::line(e.to_string()),
            }
        }
        SlashCommand::SwitchSet(_) => {
            CommandOutput::line(format!("/switch {{set}}: {}", orch.manifest_set_names().join(", ")))
        }
        SlashCommand::Help(None) => {
            let mut lines: Vec<String> = COMMAND_HELP
                .iter()
                .map(|(cmd, desc)| format!("{:<14} {}", cmd, desc))
                .collect();
            lines.extend(orch.switcher().registry().help_list());
            CommandOutput::lines(lines)
        }
        SlashCommand::Help(Some(key)) => match orch.switcher().registry().get(&key) {
            Some(m) => {
                let mut lines = vec![format!("{}: {}", m.key, m.title)];
                lines.extend(m.about.clone());
                lines.extend(m.samples.iter().map(|(_, s)| format!("  e.g. {s}")));
                CommandOutput::lines(lines)
            }
            None => CommandOutput::line(format!("Invalid slash command: {key}")),
        },
        SlashCommand::Switch(key) => {
            if !orch.switcher().registry().contains(&key) {
                return CommandOutput::line(format!("Invalid slash command: {key}"));
            }
            match orch.switch_agent(&key, true) {
                Ok(intro) => activation(orch, intro),
                Err(e) => CommandOutput::line(e.to_string()),
            }
        }
    }
}

/// 打印 sample 并作为用户输入发送给当前 agent
async fn run_sample(orch: &mut Orchestrator, sample: String) -> CommandOutput {
    let events = orch.handle_input(&sample).await;
    CommandOutput {
        lines: vec![sample],
        events,
        quit: false,
    }
}

fn activation(orch: &Orchestrator, intro: Option<String>) -> CommandOutput {
    let manifest = orch.session().manifest();
    let mut lines = vec![format!("Activating: {}", manifest.title)];
    if let Some(intro) = intro {
        lines.push(format!("{}: {}", manifest.bot, intro));
    }
    CommandOutput::lines(lines)
}
