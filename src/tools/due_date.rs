//! 截止日期默认值策略
//!
//! `today`（不区分大小写）→ DueDate::Today，在执行时刻按注入的时钟求值；
//! 其余必须是 `YYYY-MM-DD`。空串只在 create_task 的缺省路径（parse_or_today）视为 Today，
//! 显式解析时是参数错误。

use std::str::FromStr;

use chrono::NaiveDate;

use crate::core::{format_date, Clock};
use crate::tools::ToolError;

const TODAY: &str = "today";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDate {
    Today,
    Explicit(NaiveDate),
}

impl DueDate {
    /// 缺省或空白视为 Today（create_task 的默认值）
    pub fn parse_or_today(raw: Option<&str>) -> Result<Self, ToolError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(DueDate::Today),
            Some(s) => s.parse(),
        }
    }

    pub fn resolve(&self, clock: &dyn Clock) -> NaiveDate {
        match self {
            DueDate::Today => clock.today(),
            DueDate::Explicit(date) => *date,
        }
    }

    /// 求值并格式化为 YYYY-MM-DD
    pub fn resolve_string(&self, clock: &dyn Clock) -> String {
        format_date(self.resolve(clock))
    }
}

impl FromStr for DueDate {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(TODAY) {
            return Ok(DueDate::Today);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DueDate::Explicit)
            .map_err(|_| {
                ToolError::InvalidArguments(format!(
                    "due_on must be YYYY-MM-DD or \"today\", got \"{}\"",
                    s
                ))
            })
    }
}
