//! April-start fiscal calendar helpers

use crate::constants::{FISCAL_MONTH_ORDER, FISCAL_YEAR_START_MONTH};
use crate::records::Locale;

/// Map a calendar month (1-12) to its fiscal position (April = 1 ... March = 12)
pub fn fiscal_month(calendar_month: u32) -> u32 {
    if calendar_month >= FISCAL_YEAR_START_MONTH {
        calendar_month - FISCAL_YEAR_START_MONTH + 1
    } else {
        calendar_month + (12 - FISCAL_YEAR_START_MONTH + 1)
    }
}

/// Inverse of [`fiscal_month`]
pub fn calendar_month(fiscal_month: u32) -> u32 {
    FISCAL_MONTH_ORDER[((fiscal_month + 11) % 12) as usize]
}

/// Short month label for chart axes ("Apr" / "4월")
pub fn month_label(calendar_month: u32, locale: Locale) -> String {
    match locale {
        Locale::Ko => format!("{}월", calendar_month),
        Locale::En => chrono::Month::try_from(calendar_month as u8)
            .map(|m| m.name()[..3].to_string())
            .unwrap_or_else(|_| calendar_month.to_string()),
    }
}

/// Label for a fiscal year series ("FY2023" / "2023회계연도")
pub fn fiscal_year_label(year: i32, locale: Locale) -> String {
    match locale {
        Locale::Ko => format!("{}회계연도", year),
        Locale::En => format!("FY{}", year),
    }
}
