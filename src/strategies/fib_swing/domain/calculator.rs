//! 价位与仓位计算
//!
//! 回撤模式：由 fib_zero / fib_one 和形态比例表推出全部价位，再按资金亏损比例推出杠杆与数量。
//! 趋势模式：由趋势线两点和底部价格推出止损距离，再按固定风险金额推出数量。
//! 两种模式互斥，不混用。

use super::config::{EntryMode, Side, TaskConfig};
use super::error::{TaskError, TaskResult};
use super::levels::{ComputedLevels, TrendProjection, WorkingLevels};
use crate::core::types::CandleSize;

/// 止损滑点缓冲（百分比）
pub const SQUEEZE_INDENT_PERCENT: f64 = 0.25;
/// 趋势模式：止损距离 = |趋势线 - 底部| / STOP_INDENT_RATE
pub const STOP_INDENT_RATE: f64 = 3.0;
/// 杠杆上限
pub const MAX_LEVERAGE: f64 = 33.0;

const TREND_STEP_CANDLES: f64 = 10.0;
const TREND_PROJECTION_CANDLES: f64 = 20.0;
const TREND_MIN_PROFIT_R: f64 = 0.5;
const TREND_TO_ZERO_R: f64 = 1.0;
const TREND_TO_MIN_PROFIT_R: f64 = 2.0;
const TREND_TAKE_R: f64 = 3.0;

/// 按任务模式计算全部价位
pub fn compute_levels(config: &TaskConfig) -> TaskResult<ComputedLevels> {
    validate_fund(config)?;
    let levels = match config.mode {
        EntryMode::Retracement => LevelCalculator::new(config).populate_auto_fields()?,
        EntryMode::Trend => TrendCalculator::new(config)?.populate_auto_fields()?,
    };
    // 截断后不足一张，下单必然失败
    if levels.enter_amount < 1.0 {
        return Err(TaskError::InvalidConfig(format!(
            "入场数量为 {}，fund={} 过小",
            levels.enter_amount, config.fund
        )));
    }
    Ok(levels)
}

/// 斐波那契回撤计算器
pub struct LevelCalculator<'a> {
    config: &'a TaskConfig,
}

impl<'a> LevelCalculator<'a> {
    pub fn new(config: &'a TaskConfig) -> Self {
        Self { config }
    }

    /// 线性插值求回撤价位，fib_one > fib_zero 时向上，否则向下
    pub fn calc_fib_level(&self, level: f64) -> TaskResult<f64> {
        let zero = self.config.fib_zero;
        let one = self.config.fib_one;

        if !is_valid_price(zero) || !is_valid_price(one) {
            return Err(TaskError::InvalidRange(format!(
                "fib_zero={} fib_one={} 必须为正数",
                zero, one
            )));
        }
        if zero == one {
            return Err(TaskError::InvalidRange(format!(
                "fib_zero 与 fib_one 相同 ({})，无法确定方向",
                zero
            )));
        }

        let distance = (one - zero).abs() * level;
        if one > zero {
            Ok(zero + distance)
        } else {
            Ok(zero - distance)
        }
    }

    /// 计算全部自动字段
    pub fn populate_auto_fields(&self) -> TaskResult<ComputedLevels> {
        let ratios = self.config.strategy.ratios();

        let enter_price = self.calc_fib_level(ratios.enter)?;
        let stop_price = self.calc_fib_level(ratios.stop)?;
        let zero_price = self.calc_fib_level(ratios.zero)?;
        let take_price = self.calc_fib_level(ratios.take)?;
        let to_zero_trigger_price = self.calc_fib_level(ratios.to_zero_trigger)?;
        let min_profit_price = self.calc_fib_level(ratios.min_profit)?;
        let to_min_profit_trigger_price = self.calc_fib_level(ratios.to_min_profit_trigger)?;

        let side = if self.config.fib_one > self.config.fib_zero {
            Side::Long
        } else {
            Side::Short
        };

        let stop_indent = stop_indent_percent(side, enter_price, stop_price);
        let leverage = leverage_for(self.config.max_fund_loss_percent, stop_indent)?;
        let enter_amount = (self.config.fund * leverage).trunc();

        Ok(ComputedLevels {
            side,
            enter_price,
            stop_price,
            zero_price,
            take_price,
            to_zero_trigger_price,
            min_profit_price,
            to_min_profit_trigger_price,
            stop_indent,
            leverage,
            enter_amount,
            stop_amount: signed_amount(side, enter_price, stop_price, enter_amount),
            zero_amount: signed_amount(side, enter_price, zero_price, enter_amount),
            min_profit_amount: signed_amount(side, enter_price, min_profit_price, enter_amount),
            take_amount: signed_amount(side, enter_price, take_price, enter_amount),
            trend: None,
        })
    }
}

/// 趋势线确认入场计算器
pub struct TrendCalculator<'a> {
    config: &'a TaskConfig,
    side: Side,
    line_start: f64,
    line_10: f64,
    bottom: f64,
    risk_amount: f64,
}

impl<'a> TrendCalculator<'a> {
    pub fn new(config: &'a TaskConfig) -> TaskResult<Self> {
        let missing = |field: &str| TaskError::InvalidRange(format!("趋势模式缺少 {}", field));

        let side = config.direction.ok_or_else(|| missing("direction"))?;
        let line_start = config.line_start.ok_or_else(|| missing("line_start"))?;
        let line_10 = config.line_10.ok_or_else(|| missing("line_10"))?;
        let bottom = config.bottom.ok_or_else(|| missing("bottom"))?;
        let risk_amount = config.risk_amount.ok_or_else(|| missing("risk_amount"))?;

        for (name, value) in [
            ("line_start", line_start),
            ("line_10", line_10),
            ("bottom", bottom),
            ("risk_amount", risk_amount),
        ] {
            if !is_valid_price(value) {
                return Err(TaskError::InvalidRange(format!("{}={} 必须为正数", name, value)));
            }
        }
        if line_start == bottom {
            return Err(TaskError::InvalidRange(
                "bottom 与 line_start 相同，止损距离为0".to_string(),
            ));
        }

        Ok(Self {
            config,
            side,
            line_start,
            line_10,
            bottom,
            risk_amount,
        })
    }

    pub fn candle_size(&self) -> CandleSize {
        self.config.candle_size.unwrap_or(CandleSize::H1)
    }

    /// 趋势线投影：步长和第20根K线价格
    pub fn projection(&self) -> TrendProjection {
        let step = ((self.line_start - self.line_10) / TREND_STEP_CANDLES).abs();
        let slope_sign = if self.line_start > self.line_10 { -1.0 } else { 1.0 };
        TrendProjection {
            step,
            line_20: self.line_start + slope_sign * step * TREND_PROJECTION_CANDLES,
            slope_sign,
        }
    }

    pub fn populate_auto_fields(&self) -> TaskResult<ComputedLevels> {
        let working = self.working_levels(self.line_start, self.bottom)?;
        let s = self.side.sign();
        let enter_price = working.enter;
        let r = (enter_price - working.stop).abs();

        let zero_price = enter_price;
        let min_profit_price = enter_price + s * r * TREND_MIN_PROFIT_R;
        let to_zero_trigger_price = enter_price + s * r * TREND_TO_ZERO_R;
        let to_min_profit_trigger_price = enter_price + s * r * TREND_TO_MIN_PROFIT_R;
        let enter_amount = working.amount;
        let leverage = round2(enter_amount / self.config.fund).min(MAX_LEVERAGE);

        Ok(ComputedLevels {
            side: self.side,
            enter_price,
            stop_price: working.stop,
            zero_price,
            take_price: working.take,
            to_zero_trigger_price,
            min_profit_price,
            to_min_profit_trigger_price,
            stop_indent: stop_indent_percent(self.side, enter_price, working.stop),
            leverage,
            enter_amount,
            stop_amount: signed_amount(self.side, enter_price, working.stop, enter_amount),
            zero_amount: signed_amount(self.side, enter_price, zero_price, enter_amount),
            min_profit_amount: signed_amount(self.side, enter_price, min_profit_price, enter_amount),
            take_amount: signed_amount(self.side, enter_price, working.take, enter_amount),
            trend: Some(self.projection()),
        })
    }

    /// 按当前趋势线价格和底部重新计算工作价位
    pub fn working_levels(&self, line: f64, bottom: f64) -> TaskResult<WorkingLevels> {
        let s = self.side.sign();
        let stop_rate_value = (line - bottom).abs() / STOP_INDENT_RATE;
        let stop = line - s * stop_rate_value;
        let indent = stop_indent_percent(self.side, line, stop);
        if !indent.is_finite() || indent <= 0.0 {
            return Err(TaskError::InvalidRange(format!(
                "止损距离无效: line={} bottom={}",
                line, bottom
            )));
        }

        let max_amount = self.config.fund * MAX_LEVERAGE;
        let amount = (self.risk_amount * (100.0 / indent)).min(max_amount).trunc();

        Ok(WorkingLevels {
            bottom,
            enter: line,
            stop,
            take: line + s * stop_rate_value * TREND_TAKE_R,
            amount,
        })
    }

    /// 第 n 根K线时的趋势线价格
    pub fn line_at(&self, candles_elapsed: i64) -> f64 {
        let projection = self.projection();
        self.line_start + projection.slope_sign * projection.step * candles_elapsed as f64
    }

    /// 新的底部只朝不利方向扩展：做多取更低，做空取更高
    pub fn extend_bottom(&self, observed: Option<f64>) -> f64 {
        match (self.side, observed) {
            (Side::Long, Some(low)) => self.bottom.min(low),
            (Side::Short, Some(high)) => self.bottom.max(high),
            (_, None) => self.bottom,
        }
    }
}

/// 入场到止损的百分比距离，加上滑点缓冲
pub fn stop_indent_percent(side: Side, enter: f64, stop: f64) -> f64 {
    match side {
        Side::Long => 100.0 - (stop * 100.0) / enter + SQUEEZE_INDENT_PERCENT,
        Side::Short => (stop * 100.0) / enter - 100.0 + SQUEEZE_INDENT_PERCENT,
    }
}

/// 杠杆 = 允许亏损比例 / 止损距离，保留两位小数并受上限约束
pub fn leverage_for(max_fund_loss_percent: f64, stop_indent: f64) -> TaskResult<f64> {
    if !stop_indent.is_finite() || stop_indent <= 0.0 {
        return Err(TaskError::InvalidRange(format!(
            "止损距离无效: {}",
            stop_indent
        )));
    }
    Ok(round2(max_fund_loss_percent / stop_indent).min(MAX_LEVERAGE))
}

/// 带符号数量：符号表示该价位对盈亏的方向，亏损侧为负
pub fn signed_amount(side: Side, enter: f64, level: f64, enter_amount: f64) -> f64 {
    let multiplier = side.sign() * (level - enter) / enter;
    let magnitude = (enter_amount * (1.0 + multiplier)).trunc().abs();
    if multiplier < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn is_valid_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_fund(config: &TaskConfig) -> TaskResult<()> {
    if !config.fund.is_finite() || config.fund <= 0.0 {
        return Err(TaskError::InvalidConfig(format!(
            "fund={} 必须为正数",
            config.fund
        )));
    }
    if !config.max_fund_loss_percent.is_finite() || config.max_fund_loss_percent <= 0.0 {
        return Err(TaskError::InvalidConfig(format!(
            "max_fund_loss_percent={} 必须为正数",
            config.max_fund_loss_percent
        )));
    }
    Ok(())
}
