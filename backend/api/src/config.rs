use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub paystack: PaystackConfig,
    pub quiz: QuizConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub callback_url: String,
    /// One-time activation price in naira (converted to kobo on the wire).
    pub activation_amount_naira: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
    /// Questions served per quiz unless the client asks for fewer.
    pub default_question_count: usize,
    /// Hard limit on quiz duration, in seconds.
    pub time_limit_seconds: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/nurseprep".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "nurseprep".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let paystack_secret_key = settings
            .get_string("paystack.secret_key")
            .or_else(|_| env::var("PAYSTACK_SECRET_KEY"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: PAYSTACK_SECRET_KEY must be set in production!");
                }
                eprintln!("WARNING: Paystack secret key not set, payment endpoints will fail");
                String::new()
            });

        let paystack_base_url = settings
            .get_string("paystack.base_url")
            .or_else(|_| env::var("PAYSTACK_BASE_URL"))
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());

        let paystack_callback_url = settings
            .get_string("paystack.callback_url")
            .or_else(|_| env::var("PAYSTACK_CALLBACK_URL"))
            .unwrap_or_else(|_| "http://localhost:5173/dashboard".to_string());

        let activation_amount_naira = settings
            .get_int("paystack.activation_amount_naira")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| {
                env::var("ACTIVATION_AMOUNT_NAIRA")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(5000);

        let default_question_count = settings
            .get_int("quiz.default_question_count")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(50);

        let time_limit_seconds = settings
            .get_int("quiz.time_limit_seconds")
            .ok()
            .filter(|v| *v > 0)
            .or_else(|| {
                env::var("QUIZ_TIME_LIMIT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(3600);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            paystack: PaystackConfig {
                secret_key: paystack_secret_key,
                base_url: paystack_base_url,
                callback_url: paystack_callback_url,
                activation_amount_naira,
            },
            quiz: QuizConfig {
                default_question_count,
                time_limit_seconds,
            },
        })
    }
}
