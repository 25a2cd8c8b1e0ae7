pub const API_BASE: &str = "https://api.twitter.com/2";

pub const BATCH_MAX_COUNT: usize = 100;
pub const PAGE_DEFAULT_COUNT: u32 = 100;
pub const SEARCH_PAGE_MIN_COUNT: u32 = 10;

pub const DEFAULT_USER_FIELDS: &str =
    "created_at,description,entities,location,pinned_tweet_id,profile_image_url,protected,public_metrics,url,verified";
pub const DEFAULT_TWEET_FIELDS: &str =
    "attachments,author_id,conversation_id,created_at,entities,in_reply_to_user_id,lang,possibly_sensitive,public_metrics,referenced_tweets,reply_settings,source";
pub const DEFAULT_SPACE_FIELDS: &str =
    "created_at,creator_id,host_ids,lang,participant_count,scheduled_start,speaker_ids,started_at,state,title";
pub const DEFAULT_LIST_FIELDS: &str = "created_at,description,follower_count,member_count,owner_id,private";

pub const TWEET_EXPANSIONS: &str = "author_id";
pub const SPACE_EXPANSIONS: &str = "creator_id";
pub const LIST_EXPANSIONS: &str = "owner_id";
