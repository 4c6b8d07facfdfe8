use sqlx::sqlite::SqlitePool;

pub async fn setup(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(64) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username VARCHAR(64) NOT NULL,
            password VARCHAR(128) NOT NULL,
            email VARCHAR(128),
            group_id INTEGER REFERENCES groups(id),
            is_active BOOLEAN DEFAULT 1,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(128) NOT NULL,
            price REAL NOT NULL,
            stock INTEGER DEFAULT 0,
            category VARCHAR(32)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id),
            product_id INTEGER REFERENCES products(id),
            quantity INTEGER NOT NULL,
            status VARCHAR(16) DEFAULT 'pending'
        )
        "#,
    )
    .execute(pool)
    .await?;

    seed_sample_data(pool).await?;

    Ok(())
}

async fn seed_sample_data(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 > 0 {
        return Ok(());
    }

    for name in ["Administrators", "Staff", "Customers"] {
        sqlx::query("INSERT INTO groups (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    let first_names = [
        "Alice", "Bob", "Charlie", "Diana", "Evan", "Fiona", "George", "Hannah",
        "Isaac", "Julia", "Kevin", "Laura", "Michael", "Nancy", "Oscar", "Patricia",
    ];

    for index in 0..64 {
        let first = first_names[index % first_names.len()];
        let username = format!("{}{}", first.to_lowercase(), index);
        let group_id = (index % 3) as i64 + 1;
        sqlx::query("INSERT INTO users (username, password, email, group_id, is_active) VALUES (?, ?, ?, ?, ?)")
            .bind(&username)
            .bind(format!("secret{}", index))
            .bind(format!("{}@example.com", username))
            .bind(group_id)
            .bind(index % 5 != 0)
            .execute(pool)
            .await?;
    }

    let categories = ["Electronics", "Furniture", "Stationery", "Clothing", "Books"];
    let product_types = [
        "Laptop", "Mouse", "Keyboard", "Monitor", "Chair", "Desk", "Notebook", "Pen",
        "Headphones", "Lamp",
    ];

    for index in 0..50 {
        let product_type = product_types[index % product_types.len()];
        let category = categories[index % categories.len()];
        let price = 5.99 + (index as f64 * 12.5);
        let stock = (index * 7 + 5) % 120;

        sqlx::query("INSERT INTO products (name, price, stock, category) VALUES (?, ?, ?, ?)")
            .bind(format!("{} {}", product_type, index + 1))
            .bind(price)
            .bind(stock as i64)
            .bind(category)
            .execute(pool)
            .await?;
    }

    let statuses = ["pending", "processing", "shipped", "completed", "cancelled"];

    for index in 0..200 {
        sqlx::query("INSERT INTO orders (user_id, product_id, quantity, status) VALUES (?, ?, ?, ?)")
            .bind((index % 64) as i64 + 1)
            .bind((index % 50) as i64 + 1)
            .bind((index % 10) as i64 + 1)
            .bind(statuses[index % statuses.len()])
            .execute(pool)
            .await?;
    }

    tracing::info!("sample data seeded: 3 groups, 64 users, 50 products, 200 orders");
    Ok(())
}
