use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upstream show identifier (Phish.net `showid`).
pub type ShowId = i64;

/// Which part of the show a song was played in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SetLabel {
    Soundcheck,
    /// Numbered set: 1, 2, 3...
    Set(u8),
    Encore,
    Encore2,
    /// Anything the source sends that we don't model (kept verbatim)
    Other(String),
}

impl SetLabel {
    /// Sort rank within a show: soundcheck, sets in order, encores, then unknowns.
    fn rank(&self) -> (u8, u8) {
        match self {
            Self::Soundcheck => (0, 0),
            Self::Set(n) => (1, *n),
            Self::Encore => (2, 1),
            Self::Encore2 => (2, 2),
            Self::Other(_) => (3, 0),
        }
    }

    /// Phish.net code for this set ("1", "e", "e2", ...).
    pub fn code(&self) -> String {
        match self {
            Self::Soundcheck => "s".to_string(),
            Self::Set(n) => n.to_string(),
            Self::Encore => "e".to_string(),
            Self::Encore2 => "e2".to_string(),
            Self::Other(s) => s.clone(),
        }
    }
}

impl FromStr for SetLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_lowercase();
        let label = match code.as_str() {
            "s" | "soundcheck" => Self::Soundcheck,
            "e" | "encore" => Self::Encore,
            "e2" => Self::Encore2,
            other => match other.strip_prefix("set ").unwrap_or(other).parse::<u8>() {
                Ok(n) if n > 0 => Self::Set(n),
                _ => Self::Other(s.trim().to_string()),
            },
        };
        Ok(label)
    }
}

impl From<SetLabel> for String {
    fn from(label: SetLabel) -> Self {
        label.code()
    }
}

impl TryFrom<String> for SetLabel {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for SetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soundcheck => write!(f, "Soundcheck"),
            Self::Set(n) => write!(f, "Set {n}"),
            Self::Encore => write!(f, "Encore"),
            Self::Encore2 => write!(f, "Encore 2"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl PartialOrd for SetLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SetLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| self.code().cmp(&other.code()))
    }
}

/// A single performance of a song at a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub song: String,
    pub slug: String,
    pub show_id: ShowId,
    pub date: NaiveDate,
    pub set: SetLabel,
    pub position: u32,
    /// Shows since the song was last played, as reported upstream.
    pub gap: Option<u32>,
    pub duration_secs: Option<u32>,
    pub is_jamchart: bool,
    pub footnote: Option<String>,
}

impl Performance {
    pub fn is_opener(&self) -> bool {
        self.set == SetLabel::Set(1) && self.position == 1
    }

    pub fn is_encore(&self) -> bool {
        matches!(self.set, SetLabel::Encore | SetLabel::Encore2)
    }
}

/// A single show and its setlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: ShowId,
    pub date: NaiveDate,
    pub venue_id: Option<i64>,
    pub venue: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub tour_id: Option<i64>,
    pub tour_name: Option<String>,
    /// Ordered by set, then position within set.
    pub performances: Vec<Performance>,
}

impl Show {
    pub fn opener(&self) -> Option<&Performance> {
        self.performances.iter().find(|p| p.is_opener())
    }

    pub fn encores(&self) -> Vec<&Performance> {
        self.performances.iter().filter(|p| p.is_encore()).collect()
    }

    pub fn set_performances(&self, set: &SetLabel) -> Vec<&Performance> {
        self.performances.iter().filter(|p| &p.set == set).collect()
    }

    pub fn contains_song(&self, song: &str) -> bool {
        self.performances.iter().any(|p| p.song == song)
    }

    /// Sort performances into set/position order.
    pub(crate) fn sort_performances(&mut self) {
        self.performances
            .sort_by(|a, b| a.set.cmp(&b.set).then(a.position.cmp(&b.position)));
    }
}

/// A song and every performance of it, in chronological order.
#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub name: String,
    pub slug: String,
    pub performances: Vec<Performance>,
}

impl Song {
    pub fn times_played(&self) -> usize {
        self.performances.len()
    }

    pub fn debut(&self) -> Option<NaiveDate> {
        self.performances.first().map(|p| p.date)
    }

    pub fn last_played(&self) -> Option<NaiveDate> {
        self.performances.last().map(|p| p.date)
    }
}

/// Record store statistics.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub shows: i64,
    pub performances: i64,
    pub songs: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub top_songs: Vec<(String, i64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_label_parse() {
        assert_eq!("1".parse::<SetLabel>().unwrap(), SetLabel::Set(1));
        assert_eq!("Set 2".parse::<SetLabel>().unwrap(), SetLabel::Set(2));
        assert_eq!("e".parse::<SetLabel>().unwrap(), SetLabel::Encore);
        assert_eq!("E2".parse::<SetLabel>().unwrap(), SetLabel::Encore2);
        assert_eq!("s".parse::<SetLabel>().unwrap(), SetLabel::Soundcheck);
        assert_eq!("x".parse::<SetLabel>().unwrap(), SetLabel::Other("x".into()));
        assert_eq!("0".parse::<SetLabel>().unwrap(), SetLabel::Other("0".into()));
    }

    #[test]
    fn test_set_label_ordering() {
        let mut labels = vec![
            SetLabel::Encore2,
            SetLabel::Set(2),
            SetLabel::Encore,
            SetLabel::Set(1),
            SetLabel::Soundcheck,
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![
                SetLabel::Soundcheck,
                SetLabel::Set(1),
                SetLabel::Set(2),
                SetLabel::Encore,
                SetLabel::Encore2,
            ]
        );
    }

    #[test]
    fn test_set_label_code_roundtrips_through_string() {
        for label in [SetLabel::Set(3), SetLabel::Encore, SetLabel::Soundcheck] {
            let s: String = label.clone().into();
            assert_eq!(s.parse::<SetLabel>().unwrap(), label);
        }
    }

    #[test]
    fn test_opener_and_encores() {
        let date = NaiveDate::from_ymd_opt(1997, 11, 22).unwrap();
        let perf = |song: &str, set: SetLabel, position| Performance {
            song: song.to_string(),
            slug: song.to_lowercase(),
            show_id: 1,
            date,
            set,
            position,
            gap: None,
            duration_secs: None,
            is_jamchart: false,
            footnote: None,
        };
        let mut show = Show {
            id: 1,
            date,
            venue_id: None,
            venue: "Hampton Coliseum".to_string(),
            city: "Hampton".to_string(),
            state: "VA".to_string(),
            country: "USA".to_string(),
            tour_id: None,
            tour_name: None,
            performances: vec![
                perf("Tweezer Reprise", SetLabel::Encore, 1),
                perf("Tweezer", SetLabel::Set(2), 1),
                perf("Mike's Song", SetLabel::Set(1), 1),
            ],
        };
        show.sort_performances();

        assert_eq!(show.opener().unwrap().song, "Mike's Song");
        assert_eq!(show.encores().len(), 1);
        assert_eq!(show.performances[1].song, "Tweezer");
        assert!(show.contains_song("Tweezer"));
        assert!(!show.contains_song("Ghost"));
        assert_eq!(show.set_performances(&SetLabel::Set(2)).len(), 1);
    }
}
