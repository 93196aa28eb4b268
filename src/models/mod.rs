pub mod cinema;
pub mod conversation;
pub mod film;

pub use cinema::Cinema;
pub use conversation::{
    ChatMessage, ChatTurn, ConversationSession, MessageRole, PreferencePatch, Preferences,
};
pub use film::{
    composite_id, current_week_number, week_number, FilmRecord, RankedFilm, ScrapePayload,
    ScrapedCinema, ScrapedFilm, Showtime, ShowtimeSlot, EMBEDDING_DIM,
};
