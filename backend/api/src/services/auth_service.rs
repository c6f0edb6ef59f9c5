use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use redis::aio::ConnectionManager;

use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    AuthResponse, LoginRequest, PaymentStatus, RegisterRequest, User, UserProfile, UserRole,
};

const ACCESS_TOKEN_TTL_SECONDS: i64 = 24 * 3600;

// Failed-login lockout, tracked in Redis per email
const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_WINDOW_SECONDS: u64 = 900;

pub struct AuthService {
    mongo: Database,
    redis: ConnectionManager,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(mongo: Database, redis: ConnectionManager, jwt_secret: String) -> Self {
        Self {
            mongo,
            redis,
            jwt_secret,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let users = self.mongo.collection::<User>("users");

        let email = req.email.trim().to_lowercase();
        let existing = users
            .find_one(doc! { "email": &email })
            .await
            .context("Failed to check existing user")?;
        if existing.is_some() {
            return Err(anyhow!("Email already registered"));
        }

        let password_hash =
            bcrypt::hash(&req.password, bcrypt::DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: None,
            email: email.clone(),
            password_hash,
            display_name: req.display_name.trim().to_string(),
            role: UserRole::Student,
            // Locked until the activation payment is confirmed.
            is_active: false,
            payment_status: PaymentStatus::Pending,
            paystack_reference: None,
            login_count: 0,
            created_at: Utc::now(),
            last_login_at: None,
            tests_taken: 0,
            total_study_time_minutes: 0,
            average_score: 0,
            best_score: None,
            test_scores: vec![],
            weak_areas: vec![],
            strong_areas: vec![],
            last_test_date: None,
        };

        let insert_result = users
            .insert_one(&user)
            .await
            .context("Failed to insert user")?;

        let user_id = insert_result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow!("Failed to get inserted user ID"))?;

        let mut created = user;
        created.id = Some(user_id);

        tracing::info!("User registered: {} ({})", email, user_id.to_hex());

        let access_token = self.generate_access_token(&created)?;
        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(created),
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        let email = req.email.trim().to_lowercase();

        if self.is_locked_out(&email).await? {
            return Err(anyhow!("Account temporarily locked"));
        }

        let users = self.mongo.collection::<User>("users");
        let user = users
            .find_one(doc! { "email": &email })
            .await
            .context("Failed to query user")?;

        let Some(user) = user else {
            // Burn an attempt even for unknown emails so probing is throttled.
            self.record_failed_attempt(&email).await?;
            return Err(anyhow!("Invalid credentials"));
        };

        let valid = bcrypt::verify(&req.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            self.record_failed_attempt(&email).await?;
            return Err(anyhow!("Invalid credentials"));
        }

        self.clear_failed_attempts(&email).await?;

        let user_id = user
            .id
            .ok_or_else(|| anyhow!("User document missing _id"))?;

        let now = Utc::now();
        let now_bson = mongodb::bson::DateTime::from_millis(now.timestamp_millis());
        users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": { "lastLoginAt": now_bson },
                    "$inc": { "login_count": 1 },
                },
            )
            .await
            .context("Failed to update login stats")?;

        let mut user = user;
        user.last_login_at = Some(now);
        user.login_count += 1;

        tracing::info!("User logged in: {} ({})", email, user_id.to_hex());

        let access_token = self.generate_access_token(&user)?;
        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user),
        })
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile> {
        let user = self.find_user(user_id).await?;
        Ok(UserProfile::from(user))
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self.find_user(user_id).await?;

        let valid = bcrypt::verify(old_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(anyhow!("Invalid credentials"));
        }

        let new_hash =
            bcrypt::hash(new_password, bcrypt::DEFAULT_COST).context("Failed to hash password")?;

        let object_id = ObjectId::parse_str(user_id).context("Invalid user id")?;
        self.mongo
            .collection::<User>("users")
            .update_one(
                doc! { "_id": object_id },
                doc! { "$set": { "password_hash": new_hash } },
            )
            .await
            .context("Failed to update password")?;

        tracing::info!("Password changed for user: {}", user_id);
        Ok(())
    }

    pub async fn find_user(&self, user_id: &str) -> Result<User> {
        let object_id = ObjectId::parse_str(user_id).context("Invalid user id")?;
        self.mongo
            .collection::<User>("users")
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))
    }

    fn generate_access_token(&self, user: &User) -> Result<String> {
        let user_id = user
            .id
            .ok_or_else(|| anyhow!("User document missing _id"))?;
        let now = Utc::now().timestamp();

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role: user.role.as_str().to_string(),
            exp: (now + ACCESS_TOKEN_TTL_SECONDS) as usize,
            iat: now as usize,
        };

        JwtService::new(&self.jwt_secret)
            .generate_token(claims)
            .map_err(|e| anyhow!("Failed to generate token: {}", e))
    }

    async fn is_locked_out(&self, email: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let key = format!("auth:failed:{}", email);
        let attempts: Option<u32> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to read lockout counter")?;
        Ok(attempts.unwrap_or(0) >= MAX_FAILED_ATTEMPTS)
    }

    async fn record_failed_attempt(&self, email: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = format!("auth:failed:{}", email);

        let attempts: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment lockout counter")?;

        // Reset the window on first failure only.
        if attempts == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(LOCKOUT_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set lockout expiry")?;
        }

        if attempts >= MAX_FAILED_ATTEMPTS {
            tracing::warn!("Login lockout triggered for: {}", email);
        }
        Ok(())
    }

    async fn clear_failed_attempts(&self, email: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = format!("auth:failed:{}", email);
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear lockout counter")?;
        Ok(())
    }
}
