use anyhow::Context;
use juice_pos_api::{
    db::{create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "admin", "Administrator", "admin123", "admin").await?;
    let cashier_id = ensure_user(&pool, "kasir", "Kasir Tama", "kasir123", "cashier").await?;
    seed_menu(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Cashier ID: {cashier_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    username: &str,
    name: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("hashing {username}: {e}"))?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (username) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(name)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {username} (role={role})");
    Ok(user_id)
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    description: &str,
    icon: &str,
    sort_order: i32,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, description, icon, sort_order)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO UPDATE SET sort_order = EXCLUDED.sort_order
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(icon)
    .bind(sort_order)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_menu(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let fresh = ensure_category(pool, "Jus Buah Segar", "Single fruit juices", "🍊", 1).await?;
    let mix = ensure_category(pool, "Mix Juice", "Blended fruit combinations", "🍹", 2).await?;
    let addons = ensure_category(pool, "Add-ons", "Extras for any drink", "➕", 3).await?;

    let products = vec![
        ("Jus Jeruk", "Fresh orange juice", 12000_i64, fresh),
        ("Jus Alpukat", "Avocado juice with chocolate", 15000, fresh),
        ("Jus Mangga", "Sweet mango juice", 13000, fresh),
        ("Jus Semangka", "Watermelon juice", 10000, fresh),
        ("Jus Stroberi", "Strawberry juice", 14000, fresh),
        ("Mix Jeruk Wortel", "Orange and carrot", 15000, mix),
        ("Mix Tropical", "Mango, pineapple and passion fruit", 17000, mix),
        ("Extra Es Batu", "More ice", 0, addons),
        ("Extra Susu", "Condensed milk topping", 3000, addons),
        ("Extra Madu", "Honey", 4000, addons),
    ];

    for (name, description, price, category_id) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, category_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded menu");
    Ok(())
}
