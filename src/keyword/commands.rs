//! Text commands and the replies they produce.

use crate::keyword::session::START_RECORDING;

pub const LIST_TRIGGERS: &str = "查看关键词";
pub const DELETE_TRIGGER: &str = "删除关键词";
pub const ADD_GROUP: &str = "添加群组";
pub const REMOVE_GROUP: &str = "删除群组";
pub const LIST_GROUPS: &str = "查看允许的群组";

pub const RECORDING_STARTED: &str = "已开始记录，请输入问题。";
pub const QUESTION_RECORDED: &str = "问题已记录，请输入答案。";
pub const ANSWER_RECORDED: &str = "答案已记录，新的问答对已保存。";
pub const NO_TRIGGERS: &str = "当前没有记录任何关键词。";
pub const DELETE_TRIGGER_USAGE: &str = "请提供要删除的关键词，格式为：删除关键词 具体关键词";
pub const ADD_GROUP_USAGE: &str = "请提供群组ID，格式为：添加群组 群组ID";
pub const REMOVE_GROUP_USAGE: &str = "请提供群组ID，格式为：删除群组 群组ID";
pub const NO_GROUPS: &str = "当前没有允许的群组。";

/// A recognized command. `None` arguments mean the command was malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartRecording,
    ListTriggers,
    DeleteTrigger(Option<String>),
    AddGroup(Option<String>),
    RemoveGroup(Option<String>),
    ListGroups,
}

impl Command {
    /// Parse `text` if its first token is a command word.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let head = text.split_whitespace().next()?;

        let command = match head {
            START_RECORDING => Self::StartRecording,
            LIST_TRIGGERS => Self::ListTriggers,
            LIST_GROUPS => Self::ListGroups,
            // Keyword may contain spaces and is matched exactly, so keep
            // everything after the first space verbatim.
            DELETE_TRIGGER => Self::DeleteTrigger(text.split_once(' ').map(|(_, rest)| rest.to_string())),
            ADD_GROUP => Self::AddGroup(group_argument(text)),
            REMOVE_GROUP => Self::RemoveGroup(group_argument(text)),
            _ => return None,
        };
        Some(command)
    }

    /// Group management works everywhere; everything else only in allowed groups.
    pub fn requires_allowed_group(&self) -> bool {
        !matches!(self, Self::AddGroup(_) | Self::RemoveGroup(_) | Self::ListGroups)
    }
}

fn group_argument(text: &str) -> Option<String> {
    let (_, rest) = text.split_once(char::is_whitespace)?;
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

pub fn trigger_listing(questions: &[&str]) -> String {
    if questions.is_empty() {
        NO_TRIGGERS.to_string()
    } else {
        format!("当前记录的关键词如下：\n{}", questions.join("\n"))
    }
}

pub fn trigger_deleted(keyword: &str) -> String {
    format!("关键词 '{keyword}' 及其回复信息已成功删除。")
}

pub fn trigger_not_found(keyword: &str) -> String {
    format!("未找到关键词 '{keyword}'。")
}

pub fn group_added(group: &str) -> String {
    format!("群组 {group} 已添加到允许列表。")
}

pub fn group_already_allowed(group: &str) -> String {
    format!("群组 {group} 已在允许列表中。")
}

pub fn group_removed(group: &str) -> String {
    format!("群组 {group} 已从允许列表中移除，其关键词数据已清除。")
}

pub fn group_not_allowed(group: &str) -> String {
    format!("群组 {group} 不在允许列表中。")
}

pub fn group_listing(groups: &[String]) -> String {
    if groups.is_empty() {
        NO_GROUPS.to_string()
    } else {
        format!("当前允许的群组如下：\n{}", groups.join("\n"))
    }
}
