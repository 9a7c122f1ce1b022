// Metric catalog domain model
use rand::Rng;

/// Range and rounding used to synthesize a reading for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRule {
    pub min: f64,
    pub max: f64,
    pub precision: u32,
}

impl GenerationRule {
    pub fn new(min: f64, max: f64, precision: u32) -> Self {
        Self { min, max, precision }
    }

    /// Draw a uniform value in `[min, max]` rounded to `precision` decimals
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let raw = if self.min < self.max {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        // Rounding can push a value a hair outside the range at the edges
        round_to(raw, self.precision).clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub unit: String,
    pub rule: GenerationRule,
    pub aliases: Vec<String>,
}

impl Metric {
    pub fn new(id: impl Into<String>, unit: impl Into<String>, rule: GenerationRule) -> Self {
        Self {
            id: id.into(),
            unit: unit.into(),
            rule,
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.id == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Fixed set of metrics known to both producer and consumer
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCatalog {
    metrics: Vec<Metric>,
}

impl MetricCatalog {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    /// The chiller sensor set published by the field simulator
    pub fn hvac() -> Self {
        Self::new(vec![
            Metric::new("Voltage (V)", "V", GenerationRule::new(200.0, 240.0, 2)),
            Metric::new("Current (I)", "A", GenerationRule::new(5.0, 15.0, 2)),
            Metric::new("Power (P)", "W", GenerationRule::new(500.0, 2000.0, 2)),
            Metric::new("Frequency (F)", "Hz", GenerationRule::new(49.0, 51.0, 2))
                .with_alias("Frequency"),
            Metric::new("Vibration", "mm/s", GenerationRule::new(0.0, 5.0, 2)),
            Metric::new("Temp (T)", "°C", GenerationRule::new(20.0, 35.0, 2)),
            Metric::new("Flow Rate", "L/min", GenerationRule::new(10.0, 100.0, 2)),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Look a metric up by canonical id or alias
    pub fn resolve(&self, name: &str) -> Option<&Metric> {
        self.metrics
            .iter()
            .find(|m| m.id == name)
            .or_else(|| self.metrics.iter().find(|m| m.answers_to(name)))
    }
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::hvac()
    }
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(220.456, 2), 220.46);
        assert_eq!(round_to(10.0, 2), 10.0);
        assert_eq!(round_to(-1.005_1, 2), -1.01);
        assert_eq!(round_to(3.7, 0), 4.0);
    }

    #[test]
    fn test_sample_stays_in_range_and_precision() {
        let mut rng = StdRng::seed_from_u64(7);
        let rule = GenerationRule::new(49.0, 51.0, 2);

        for _ in 0..1_000 {
            let value = rule.sample(&mut rng);
            assert!((49.0..=51.0).contains(&value), "{value} out of range");
            assert!((value * 100.0 - (value * 100.0).round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_degenerate_rule_returns_min() {
        let mut rng = StdRng::seed_from_u64(1);
        let rule = GenerationRule::new(3.5, 3.5, 2);
        assert_eq!(rule.sample(&mut rng), 3.5);
    }

    #[test]
    fn test_hvac_catalog() {
        let catalog = MetricCatalog::hvac();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.resolve("Temp (T)").unwrap().unit, "°C");
        assert!(catalog.resolve("Pressure").is_none());
    }

    #[test]
    fn test_resolve_alias() {
        let catalog = MetricCatalog::hvac();
        let metric = catalog.resolve("Frequency").unwrap();
        assert_eq!(metric.id, "Frequency (F)");
    }
}
