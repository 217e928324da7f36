//! Deterministic dividend models compiled to year-fraction space.
//!
//! A continuous yield reduces the risk-neutral drift; discrete cash
//! dividends become downward spot jumps at their ex-dates on the simulation
//! grid. Mixed models carry both.

/// One compiled discrete dividend event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividendEvent {
    /// Ex-dividend time in years from valuation.
    pub time: f64,
    /// Cash amount in underlying currency.
    pub amount: f64,
}

impl DividendEvent {
    pub fn new(time: f64, amount: f64) -> Result<Self, String> {
        let event = Self { time, amount };
        event.validate()?;
        Ok(event)
    }

    fn validate(self) -> Result<(), String> {
        if !self.time.is_finite() || self.time <= 0.0 {
            return Err("dividend ex-date must be after valuation".to_string());
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err("dividend amount must be finite and >= 0".to_string());
        }
        Ok(())
    }
}

/// Per-underlying dividend model.
#[derive(Debug, Clone, PartialEq)]
pub enum DividendModel {
    /// Continuous annualized yield `q`.
    Continuous { yield_rate: f64 },
    /// Cash dividends at discrete ex-dates.
    Discrete { events: Vec<DividendEvent> },
    /// Continuous yield plus discrete cash dividends.
    Mixed {
        yield_rate: f64,
        events: Vec<DividendEvent>,
    },
}

impl DividendModel {
    /// Builds a discrete (or mixed) model, sorting events by ex-date.
    pub fn with_events(
        yield_rate: Option<f64>,
        mut events: Vec<DividendEvent>,
    ) -> Result<Self, String> {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let model = match yield_rate {
            Some(q) => Self::Mixed {
                yield_rate: q,
                events,
            },
            None => Self::Discrete { events },
        };
        model.validate()?;
        Ok(model)
    }

    /// Continuous yield component (zero for purely discrete models).
    #[inline]
    pub fn continuous_yield(&self) -> f64 {
        match self {
            Self::Continuous { yield_rate } => *yield_rate,
            Self::Discrete { .. } => 0.0,
            Self::Mixed { yield_rate, .. } => *yield_rate,
        }
    }

    /// Discrete events, sorted by ex-date.
    #[inline]
    pub fn events(&self) -> &[DividendEvent] {
        match self {
            Self::Continuous { .. } => &[],
            Self::Discrete { events } | Self::Mixed { events, .. } => events,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let q = self.continuous_yield();
        if !q.is_finite() || q < 0.0 {
            return Err("continuous dividend yield must be finite and >= 0".to_string());
        }
        let mut prev_time = 0.0_f64;
        for event in self.events() {
            event.validate()?;
            if event.time < prev_time {
                return Err("dividend events must be sorted by ex-date".to_string());
            }
            prev_time = event.time;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_model_exposes_yield_and_no_events() {
        let model = DividendModel::Continuous { yield_rate: 0.02 };
        assert_eq!(model.continuous_yield(), 0.02);
        assert!(model.events().is_empty());
        assert!(model.validate().is_ok());
    }

    #[test]
    fn with_events_sorts_by_ex_date() {
        let model = DividendModel::with_events(
            None,
            vec![
                DividendEvent::new(0.75, 0.5).unwrap(),
                DividendEvent::new(0.25, 1.0).unwrap(),
            ],
        )
        .unwrap();
        let times: Vec<f64> = model.events().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.25, 0.75]);
    }

    #[test]
    fn negative_yield_is_rejected() {
        let model = DividendModel::Continuous { yield_rate: -0.01 };
        assert!(model.validate().is_err());
    }

    #[test]
    fn mixed_model_carries_both_components() {
        let model = DividendModel::with_events(
            Some(0.01),
            vec![DividendEvent::new(0.5, 2.0).unwrap()],
        )
        .unwrap();
        assert_eq!(model.continuous_yield(), 0.01);
        assert_eq!(model.events().len(), 1);
    }
}
