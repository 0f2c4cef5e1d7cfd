use crate::data::reading::Reading;

/// An ordered group of readings processed as a unit.
///
/// A batch never holds more readings than the size it was requested with; the
/// last batch of a bounded source may be shorter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    readings: Vec<Reading>,
}

impl Batch {
    pub fn new(readings: Vec<Reading>) -> Self {
        Batch { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    /// Values of one channel, in row order.
    pub fn column(&self, channel: usize) -> Vec<f64> {
        self.readings.iter().map(|r| r.values[channel]).collect()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.readings.last().map(|r| r.timestamp)
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }
}

impl From<Vec<Reading>> for Batch {
    fn from(readings: Vec<Reading>) -> Self {
        Batch::new(readings)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
