// External Steam collaborators: trait seams and the Web API implementation

pub mod steam_web;
pub mod transport;

pub use steam_web::{CommunitySession, SteamWebClient};
pub use transport::{
    Credentials, LoginOutcome, OAuthData, OfferSnapshot, OfferTransport, SessionCookies,
    SessionProvider,
};
