use tinyvec::ArrayVec;

/// Bytes in a talker + sentence identifier, e.g. `GPRMC`
pub const SENTENCE_ID_LEN: usize = 5;
pub const RMC_ID: [u8; SENTENCE_ID_LEN] = *b"GPRMC";

// GPRMC field layout, counted in commas after the identifier:
// $GPRMC,<1 utc time>,<2 status>,<3 lat>,<4 N|S>,<5 lon>,<6 E|W>,...
pub const RMC_STATUS_FIELD: u8 = 2;
pub const RMC_LATITUDE_FIELD: u8 = 3;

/// Longest NMEA 0183 sentence, `$` through `\n`
pub const MAX_SENTENCE_LEN: usize = 82;
/// Bytes of `ddmm.mmmm,N,dddmm.mmmm,E`
pub const COORDINATE_LEN: usize = 24;

// States are named for the portion of the sentence which was *last received*
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ScanState {
    Idle,
    Id { matched: u8 },
    Field { index: u8 },
    Located,
}
use ScanState::*;

/// Finds the start of one comma-separated field of one sentence type.
///
/// Bytes are fed one at a time; `feed` returns `true` once the *next* byte on
/// the wire is the first byte of the requested field. Any `$` restarts the
/// search and a newline abandons the current sentence, so sentences of other
/// types (`$GPGGA`, `$GPGSV`, ...) are skipped.
#[derive(Copy, Clone, Debug)]
pub struct SentenceScanner {
    id: [u8; SENTENCE_ID_LEN],
    field: u8,
    state: ScanState,
}

impl SentenceScanner {
    /// `field` counts from 1, the field right after the identifier.
    pub const fn new(id: [u8; SENTENCE_ID_LEN], field: u8) -> Self {
        assert!(field >= 1, "field 0 is the sentence identifier");
        Self {
            id,
            field,
            state: Idle,
        }
    }

    pub const fn rmc_status() -> Self {
        Self::new(RMC_ID, RMC_STATUS_FIELD)
    }

    pub const fn rmc_latitude() -> Self {
        Self::new(RMC_ID, RMC_LATITUDE_FIELD)
    }

    pub fn reset(&mut self) {
        self.state = Idle;
    }

    pub fn located(&self) -> bool {
        self.state == Located
    }

    pub fn feed(&mut self, b: u8) -> bool {
        if b == b'$' {
            self.state = Id { matched: 0 };
            return false;
        }
        if b == b'\n' {
            self.state = Idle;
            return false;
        }

        self.state = match self.state {
            Idle => Idle,
            Id { matched } if matched as usize == SENTENCE_ID_LEN => {
                if b == b',' {
                    self.enter_field(1)
                } else {
                    // Longer identifier that merely starts with ours
                    Idle
                }
            }
            Id { matched } => {
                if self.id[matched as usize] == b {
                    Id {
                        matched: matched + 1,
                    }
                } else {
                    Idle
                }
            }
            Field { index } => {
                if b == b',' {
                    self.enter_field(index.saturating_add(1))
                } else {
                    Field { index }
                }
            }
            Located => Located,
        };

        if self.state == Located {
            debug!("found field {=u8}", self.field);
            true
        } else {
            false
        }
    }

    fn enter_field(&self, index: u8) -> ScanState {
        if index == self.field {
            Located
        } else {
            Field { index }
        }
    }
}

/// Raw coordinate text copied out of a GPRMC sentence.
///
/// Carries its own length; nothing after `len()` is meaningful.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Location(pub ArrayVec<[u8; COORDINATE_LEN]>);

#[cfg(feature = "defmt")]
impl defmt::Format for Location {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:a}", self.0.as_slice())
    }
}

impl core::ops::Deref for Location {
    type Target = ArrayVec<[u8; COORDINATE_LEN]>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for Location {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Location {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Decodes `ddmm.mmmm,N,dddmm.mmmm,E` into signed decimal degrees.
    ///
    /// Returns `None` for void receivers that leave the fields empty, and for
    /// text truncated before the longitude hemisphere.
    pub fn position(&self) -> Option<Position> {
        let text = core::str::from_utf8(self.as_bytes()).ok()?;
        let mut fields = text.trim_end_matches(['\r', '\n']).split(',');

        let lat = parse_angle(fields.next()?)?;
        let lat = match fields.next()? {
            "N" => lat,
            "S" => -lat,
            _ => return None,
        };
        let lon = parse_angle(fields.next()?)?;
        let lon = match fields.next()? {
            "E" => lon,
            "W" => -lon,
            _ => return None,
        };

        Some(Position { lat, lon })
    }
}

// `[d]ddmm.mmmm`: everything up to two digits before the point is degrees
fn parse_angle(s: &str) -> Option<f32> {
    let point = s.find('.').unwrap_or(s.len());
    let split = point.checked_sub(2)?;
    let (deg, min) = s.split_at(split);
    let deg: u16 = if deg.is_empty() { 0 } else { deg.parse().ok()? };
    let min: f32 = min.parse().ok()?;
    if min >= 60.0 {
        return None;
    }
    Some(deg as f32 + min / 60.0)
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(scanner: &mut SentenceScanner, bytes: &[u8]) -> Option<usize> {
        bytes.iter().position(|&b| scanner.feed(b))
    }

    fn location(text: &[u8]) -> Location {
        let mut loc = Location::new();
        loc.extend_from_slice(text);
        loc
    }

    #[test]
    fn locates_status_field() {
        let line = b"$GPRMC,123519.000,A,4807.0380,N,01131.0000,E,022.4,084.4,230394,003.1,W*6A\r\n";
        let mut scanner = SentenceScanner::rmc_status();
        let at = scan(&mut scanner, line).unwrap();
        assert_eq!(line[at + 1], b'A');
        assert!(scanner.located());
    }

    #[test]
    fn locates_latitude_field() {
        let line = b"$GPRMC,123519.000,A,4807.0380,N,01131.0000,E,022.4\r\n";
        let mut scanner = SentenceScanner::rmc_latitude();
        let at = scan(&mut scanner, line).unwrap();
        assert_eq!(&line[at + 1..at + 1 + COORDINATE_LEN], b"4807.0380,N,01131.0000,E");
    }

    #[test]
    fn skips_other_sentences() {
        let stream = b"$GPGGA,000000,A,B,C\n$GPRMC,000000,A,1234.56,N\n";
        let mut scanner = SentenceScanner::rmc_status();
        let at = scan(&mut scanner, stream).unwrap();
        assert!(at > 20);
        assert_eq!(stream[at + 1], b'A');
    }

    #[test]
    fn rejects_longer_identifier() {
        let mut scanner = SentenceScanner::rmc_status();
        assert_eq!(scan(&mut scanner, b"$GPRMCX,1,A,\n"), None);
    }

    #[test]
    fn newline_abandons_sentence() {
        // Status field never reached before the line ends
        let mut scanner = SentenceScanner::rmc_status();
        assert_eq!(scan(&mut scanner, b"$GPRMC,1\n,A,"), None);
    }

    #[test]
    fn dollar_restarts_mid_sentence() {
        let mut scanner = SentenceScanner::rmc_status();
        let stream = b"$GPR$GPRMC,1,V,";
        let at = scan(&mut scanner, stream).unwrap();
        assert_eq!(stream[at + 1], b'V');
    }

    #[test]
    fn reset_starts_over() {
        let mut scanner = SentenceScanner::rmc_status();
        assert!(scan(&mut scanner, b"$GPRMC,1,").is_some());
        scanner.reset();
        assert!(!scanner.located());
        assert!(scan(&mut scanner, b"A,4807").is_none());
    }

    #[test]
    #[should_panic]
    fn field_zero_is_rejected() {
        let _ = SentenceScanner::new(RMC_ID, 0);
    }

    #[test]
    fn decodes_north_east() {
        let pos = location(b"4807.0380,N,01131.0000,E").position().unwrap();
        assert!((pos.lat - 48.1173).abs() < 1e-4);
        assert!((pos.lon - 11.516_666).abs() < 1e-4);
    }

    #[test]
    fn decodes_south_west() {
        let pos = location(b"3345.1234,S,07040.5000,W").position().unwrap();
        assert!((pos.lat + 33.752_056).abs() < 1e-4);
        assert!((pos.lon + 70.675).abs() < 1e-4);
    }

    #[test]
    fn decodes_short_fields_with_newline() {
        // Receivers with four decimal places fit in fewer than 24 bytes
        let pos = location(b"1234.56,N,01234.56,E,\r\n").position().unwrap();
        assert!((pos.lat - 12.576).abs() < 1e-4);
        assert!((pos.lon - 12.576).abs() < 1e-4);
    }

    #[test]
    fn void_fields_have_no_position() {
        assert_eq!(location(b",,,,,,,,,\r\n").position(), None);
        assert_eq!(location(b"4807.0380,N,01131.00").position(), None);
        assert_eq!(location(b"4807.0380,X,01131.0000,E").position(), None);
    }
}
