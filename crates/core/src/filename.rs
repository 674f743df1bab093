use once_cell::sync::Lazy;
use regex::Regex;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<month>\d{2})_(?P<day>\d{2})_(?P<hour>\d{2})_(?P<minute>\d{2})_(?P<second>\d{2})\.dat$")
        .expect("valid regex")
});

/// Time slot a `MM_DD_HH_MM_SS.dat` file name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotName {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl SlotName {
    pub fn new(month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{:02}_{:02}_{:02}_{:02}_{:02}.dat",
            self.month, self.day, self.hour, self.minute, self.second
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let caps = NAME_RE.captures(name)?;
        let field = |key: &str| caps.name(key).and_then(|m| m.as_str().parse().ok());
        Some(Self {
            month: field("month")?,
            day: field("day")?,
            hour: field("hour")?,
            minute: field("minute")?,
            second: field("second")?,
        })
    }
}
