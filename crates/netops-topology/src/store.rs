use crate::error::TransformError;
use crate::model::{
    CdpNeighborRecord, HighUtilizationRow, InterfaceCapacity, InterfaceSummary, Topology,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info};

/// SQLite-backed store for topology and interface records.
///
/// Every table upserts by its uniqueness key (insert-or-replace), so the
/// store always reflects the latest transformation run.
pub struct TopologyStore {
    pool: SqlitePool,
}

impl TopologyStore {
    pub async fn new(database_url: &str) -> Result<Self, TransformError> {
        info!(database_url, "Initializing topology database");

        let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                error!(database_url, "Invalid database URL: {}", e);
                TransformError::DatabaseError(e)
            })?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Self::create_tables(&pool).await?;

        info!("Topology store initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), TransformError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                router_id TEXT,
                country TEXT,
                type TEXT DEFAULT 'router'
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                cost INTEGER NOT NULL,
                cost_source TEXT,
                source_interface TEXT,
                target_interface TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS physical_links (
                id TEXT PRIMARY KEY,
                router_a TEXT NOT NULL,
                router_b TEXT NOT NULL,
                cost_a_to_b INTEGER,
                cost_b_to_a INTEGER,
                interface_a TEXT,
                interface_b TEXT,
                cost_source_a TEXT,
                cost_source_b TEXT,
                is_asymmetric INTEGER DEFAULT 0,
                UNIQUE(router_a, router_b, interface_a)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interface_capacity (
                id TEXT PRIMARY KEY,
                router TEXT NOT NULL,
                interface TEXT NOT NULL,
                description TEXT,
                admin_status TEXT,
                line_protocol TEXT,
                bw_kbps INTEGER DEFAULT 0,
                capacity_class TEXT,
                input_rate_bps INTEGER DEFAULT 0,
                output_rate_bps INTEGER DEFAULT 0,
                input_utilization_pct REAL DEFAULT 0,
                output_utilization_pct REAL DEFAULT 0,
                mac_address TEXT,
                mtu INTEGER,
                encapsulation TEXT,
                is_physical INTEGER DEFAULT 1,
                parent_interface TEXT,
                neighbor_router TEXT,
                neighbor_interface TEXT,
                updated_at TEXT,
                UNIQUE(router, interface)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cdp_neighbors (
                id TEXT PRIMARY KEY,
                local_router TEXT NOT NULL,
                local_interface TEXT NOT NULL,
                remote_router TEXT NOT NULL,
                remote_interface TEXT,
                remote_platform TEXT,
                remote_ip TEXT,
                updated_at TEXT,
                UNIQUE(local_router, local_interface, remote_router)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Upsert every node, directional link and physical link of a topology.
    pub async fn save_topology(&self, topology: &Topology) -> Result<(), TransformError> {
        info!(
            nodes = topology.nodes.len(),
            links = topology.links.len(),
            physical_links = topology.physical_links.len(),
            "Saving topology"
        );

        for node in &topology.nodes {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO nodes (id, name, router_id, country, type)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&node.id)
            .bind(&node.name)
            .bind(&node.router_id)
            .bind(&node.country)
            .bind(&node.node_type)
            .execute(&self.pool)
            .await?;
        }

        for link in &topology.links {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO links
                (id, source, target, cost, cost_source, source_interface, target_interface)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&link.id)
            .bind(&link.source)
            .bind(&link.target)
            .bind(link.cost)
            .bind(link.cost_source.as_str())
            .bind(&link.source_interface)
            .bind(&link.target_interface)
            .execute(&self.pool)
            .await?;
        }

        for plink in &topology.physical_links {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO physical_links
                (id, router_a, router_b, cost_a_to_b, cost_b_to_a,
                 interface_a, interface_b, cost_source_a, cost_source_b, is_asymmetric)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&plink.id)
            .bind(&plink.router_a)
            .bind(&plink.router_b)
            .bind(plink.cost_a_to_b)
            .bind(plink.cost_b_to_a)
            .bind(&plink.interface_a)
            .bind(&plink.interface_b)
            .bind(plink.cost_source_a.map(|s| s.as_str()))
            .bind(plink.cost_source_b.map(|s| s.as_str()))
            .bind(plink.is_asymmetric)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Upsert interface-capacity rows by `(router, interface)`.
    pub async fn save_interfaces(
        &self,
        interfaces: &[InterfaceCapacity],
    ) -> Result<(), TransformError> {
        for intf in interfaces {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO interface_capacity
                (id, router, interface, description, admin_status, line_protocol,
                 bw_kbps, capacity_class, input_rate_bps, output_rate_bps,
                 input_utilization_pct, output_utilization_pct, mac_address, mtu,
                 encapsulation, is_physical, parent_interface, neighbor_router,
                 neighbor_interface, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&intf.id)
            .bind(&intf.router)
            .bind(&intf.interface)
            .bind(&intf.description)
            .bind(&intf.admin_status)
            .bind(&intf.line_protocol)
            .bind(intf.bw_kbps as i64)
            .bind(&intf.capacity_class)
            .bind(intf.input_rate_bps as i64)
            .bind(intf.output_rate_bps as i64)
            .bind(intf.input_utilization_pct)
            .bind(intf.output_utilization_pct)
            .bind(&intf.mac_address)
            .bind(intf.mtu)
            .bind(&intf.encapsulation)
            .bind(intf.is_physical)
            .bind(&intf.parent_interface)
            .bind(&intf.neighbor_router)
            .bind(&intf.neighbor_interface)
            .bind(intf.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }

        info!("Saved {} interface rows", interfaces.len());
        Ok(())
    }

    /// Upsert CDP rows by `(local_router, local_interface, remote_router)`.
    pub async fn save_cdp_neighbors(
        &self,
        neighbors: &[CdpNeighborRecord],
    ) -> Result<(), TransformError> {
        for nbr in neighbors {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO cdp_neighbors
                (id, local_router, local_interface, remote_router, remote_interface,
                 remote_platform, remote_ip, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&nbr.id)
            .bind(&nbr.local_router)
            .bind(&nbr.local_interface)
            .bind(&nbr.remote_router)
            .bind(&nbr.remote_interface)
            .bind(&nbr.remote_platform)
            .bind(&nbr.remote_ip)
            .bind(nbr.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }

        info!("Saved {} CDP neighbor rows", neighbors.len());
        Ok(())
    }

    /// Summary of the interface-capacity table.
    pub async fn interface_summary(&self) -> Result<InterfaceSummary, TransformError> {
        let mut summary = InterfaceSummary::default();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM interface_capacity")
            .fetch_one(&self.pool)
            .await?;
        summary.total_interfaces = row.get::<i64, _>("n") as u32;

        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM interface_capacity WHERE is_physical = 1")
                .fetch_one(&self.pool)
                .await?;
        summary.physical_interfaces = row.get::<i64, _>("n") as u32;
        summary.logical_interfaces = summary.total_interfaces - summary.physical_interfaces;

        let rows = sqlx::query(
            "SELECT capacity_class, COUNT(*) AS n FROM interface_capacity GROUP BY capacity_class",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let class: Option<String> = row.get("capacity_class");
            summary
                .by_capacity_class
                .insert(class.unwrap_or_else(|| "Unknown".to_string()), row.get::<i64, _>("n") as u32);
        }

        let rows =
            sqlx::query("SELECT router, COUNT(*) AS n FROM interface_capacity GROUP BY router")
                .fetch_all(&self.pool)
                .await?;
        for row in rows {
            summary
                .by_router
                .insert(row.get("router"), row.get::<i64, _>("n") as u32);
        }

        let rows = sqlx::query(
            r#"
            SELECT router, interface, input_utilization_pct, output_utilization_pct, bw_kbps
            FROM interface_capacity
            WHERE input_utilization_pct > 50 OR output_utilization_pct > 50
            ORDER BY (input_utilization_pct + output_utilization_pct) DESC
            LIMIT 20
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            summary.high_utilization.push(HighUtilizationRow {
                router: row.get("router"),
                interface: row.get("interface"),
                input_pct: row.get("input_utilization_pct"),
                output_pct: row.get("output_utilization_pct"),
                bw_kbps: row.get::<i64, _>("bw_kbps") as u64,
            });
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CostSource, DirectionalLink, PhysicalLink, TopologyMetadata, TopologyNode};
    use chrono::Utc;

    fn sample_topology() -> Topology {
        Topology {
            nodes: vec![TopologyNode {
                id: "deu-r1".to_string(),
                name: "deu-r1".to_string(),
                router_id: "172.16.1.1".to_string(),
                country: "DEU".to_string(),
                node_type: "router".to_string(),
            }],
            links: vec![DirectionalLink {
                id: "deu-r1-fra-r2-1".to_string(),
                source: "deu-r1".to_string(),
                target: "fra-r2".to_string(),
                cost: 100,
                cost_source: CostSource::Lsa,
                source_interface: "Gi0/0/0/1".to_string(),
                target_interface: "unknown".to_string(),
            }],
            physical_links: vec![PhysicalLink {
                id: "deu-r1-fra-r2-Gi0001".to_string(),
                router_a: "deu-r1".to_string(),
                router_b: "fra-r2".to_string(),
                cost_a_to_b: Some(100),
                cost_b_to_a: Some(100),
                interface_a: Some("Gi0/0/0/1".to_string()),
                interface_b: Some("Gi0/0/0/1".to_string()),
                cost_source_a: Some(CostSource::Lsa),
                cost_source_b: Some(CostSource::Lsa),
                is_asymmetric: false,
            }],
            timestamp: Utc::now(),
            metadata: TopologyMetadata::default(),
        }
    }

    #[tokio::test]
    async fn topology_round_trips_with_replace_semantics() {
        let store = TopologyStore::new("sqlite::memory:").await.unwrap();
        let topology = sample_topology();

        store.save_topology(&topology).await.unwrap();
        // Saving again replaces rather than duplicating
        store.save_topology(&topology).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM physical_links")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);

        let row = sqlx::query("SELECT country FROM nodes WHERE id = 'deu-r1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("country"), "DEU");
    }

    #[tokio::test]
    async fn interface_upsert_is_keyed_on_router_and_interface() {
        let store = TopologyStore::new("sqlite::memory:").await.unwrap();

        let mut intf = InterfaceCapacity {
            id: "one".to_string(),
            router: "deu-r1".to_string(),
            interface: "Gi0/0/0/1".to_string(),
            description: String::new(),
            admin_status: "up".to_string(),
            line_protocol: "up".to_string(),
            bw_kbps: 1_000_000,
            capacity_class: "1G".to_string(),
            input_rate_bps: 0,
            output_rate_bps: 0,
            input_utilization_pct: 0.0,
            output_utilization_pct: 0.0,
            mac_address: String::new(),
            mtu: 1514,
            encapsulation: "ARPA".to_string(),
            is_physical: true,
            parent_interface: None,
            neighbor_router: None,
            neighbor_interface: None,
            updated_at: Utc::now(),
        };
        store.save_interfaces(std::slice::from_ref(&intf)).await.unwrap();

        // Same (router, interface) under a new id replaces the row
        intf.id = "two".to_string();
        intf.capacity_class = "10G".to_string();
        store.save_interfaces(std::slice::from_ref(&intf)).await.unwrap();

        let summary = store.interface_summary().await.unwrap();
        assert_eq!(summary.total_interfaces, 1);
        assert_eq!(summary.by_capacity_class.get("10G"), Some(&1));
    }
}
