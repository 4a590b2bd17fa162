// Rating engine constants.
// If updating the base points, the stored score distribution must be rebased too.
pub const BASE_RANKING_POINTS: f64 = 4000.0; // Given to a new player on first connection to a ranked server
pub const BASE_RATING_DEVIATION: f64 = 1000.0; // Given to a new player on first connection to a ranked server
pub const MIN_RATING_DEVIATION: f64 = 100.0; // A server cron job raises RD again for inactive players
pub const BASE_RD_PER_DISCONNECT: f64 = 15.0;
pub const VAR_RD_PER_DISCONNECT: f64 = 3.0;
pub const MAX_SCALING_TIME: f64 = 360.0;
pub const BASE_POINTS_PER_SECOND: f64 = 0.25;
pub const HANDICAP_OFFSET: f64 = 2000.0;
// Flat preview penalty applied while a disconnect has not yet gone through
// the end-of-race update
pub const DISCONNECT_SCORE_PENALTY: f64 = 200.0;
