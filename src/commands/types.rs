// 命令层输出类型

use anyhow::Result;
use serde::Serialize;

/// 输出模式：人类可读文本或 JSON
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// JSON 模式下输出 `value`，否则输出 `human` 生成的文本
    pub fn emit<T, F>(&self, value: &T, human: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&T) -> String,
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = human(value);
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Ok(())
    }

    /// 流式事件：JSON 模式每行一个对象
    pub fn event<T, F>(&self, value: &T, human: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            println!("{}", human(value));
        }
        Ok(())
    }
}
