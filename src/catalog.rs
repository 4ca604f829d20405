//! Built-in entity catalog
//!
//! Every upstream entity the tool knows how to stage, with its endpoints,
//! staging table, batch sizes and mapper.

use crate::error::{Error, Result};
use crate::mapping::{self, MapFn};
use crate::source::{DetailRequest, EndpointSpec, ListingShape, WindowFilter};

/// Default ids per listing page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default records per upsert batch
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Static description of one upstream entity
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    /// Entity name used on the command line and in the ledgers
    pub name: &'static str,
    /// Staging table inside the `stg` schema
    pub physical_table: &'static str,
    /// Upstream endpoints
    pub endpoint: EndpointSpec,
    /// Whether the listing honours modification-date filters
    pub supports_incremental: bool,
    /// Payload mapper
    pub mapper: MapFn,
    /// Ids per listing page
    pub page_size: u32,
    /// Records per upsert batch
    pub batch_size: usize,
}

impl EntitySpec {
    const fn new(
        name: &'static str,
        physical_table: &'static str,
        endpoint: EndpointSpec,
        supports_incremental: bool,
        mapper: MapFn,
    ) -> Self {
        Self {
            name,
            physical_table,
            endpoint,
            supports_incremental,
            mapper,
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

const fn ids_then_detail(
    collection: &'static str,
    detail: DetailRequest,
    filter: WindowFilter,
) -> EndpointSpec {
    EndpointSpec {
        collection,
        shape: ListingShape::IdsThenDetail,
        detail,
        filter,
    }
}

const fn inline(collection: &'static str, detail: &'static str) -> EndpointSpec {
    EndpointSpec {
        collection,
        shape: ListingShape::Inline,
        detail: DetailRequest::Path(detail),
        filter: WindowFilter::None,
    }
}

static CATALOG: [EntitySpec; 12] = [
    EntitySpec::new(
        "company",
        "company",
        EndpointSpec {
            collection: "empresas/me/dados-basicos",
            shape: ListingShape::Singleton,
            detail: DetailRequest::Path("empresas/me/dados-basicos"),
            filter: WindowFilter::None,
        },
        false,
        mapping::map_company,
    ),
    EntitySpec::new(
        "product_category",
        "product_category",
        inline("categorias/produtos", "categorias/produtos/{id}"),
        false,
        mapping::map_product_category,
    ),
    EntitySpec::new(
        "product_group",
        "product_group",
        inline("grupos-produtos", "grupos-produtos/{id}"),
        false,
        mapping::map_product_group,
    ),
    EntitySpec::new(
        "product",
        "product",
        ids_then_detail(
            "produtos",
            DetailRequest::Path("produtos/{id}"),
            WindowFilter::Modified,
        ),
        true,
        mapping::map_product,
    ),
    EntitySpec::new(
        "sales_channel",
        "sales_channel",
        inline("canais-venda", "canais-venda/{id}"),
        false,
        mapping::map_sales_channel,
    ),
    EntitySpec::new(
        "seller",
        "seller",
        ids_then_detail(
            "vendedores",
            DetailRequest::Path("vendedores/{id}"),
            WindowFilter::None,
        ),
        false,
        mapping::map_seller,
    ),
    EntitySpec::new(
        "warehouse",
        "warehouse",
        inline("depositos", "depositos/{id}"),
        false,
        mapping::map_warehouse,
    ),
    EntitySpec::new(
        "stock_balance",
        "stock_balance",
        ids_then_detail(
            "produtos",
            DetailRequest::Query {
                path: "estoques/saldos",
                param: "idsProdutos[]",
            },
            WindowFilter::None,
        ),
        false,
        mapping::map_stock_balance,
    ),
    EntitySpec::new(
        "sales_order",
        "sales_order",
        ids_then_detail(
            "pedidos/vendas",
            DetailRequest::Path("pedidos/vendas/{id}"),
            WindowFilter::CreatedOrModified,
        ),
        true,
        mapping::map_sales_order,
    ),
    EntitySpec::new(
        "contact",
        "contact",
        ids_then_detail(
            "contatos",
            DetailRequest::Path("contatos/{id}"),
            WindowFilter::Modified,
        ),
        true,
        mapping::map_contact,
    ),
    EntitySpec::new(
        "financial_category",
        "financial_category",
        inline(
            "categorias/receitas-despesas",
            "categorias/receitas-despesas/{id}",
        ),
        false,
        mapping::map_financial_category,
    ),
    EntitySpec::new(
        "bill_of_materials",
        "bill_of_materials",
        ids_then_detail(
            "produtos",
            DetailRequest::Path("produtos/estruturas/{id}"),
            WindowFilter::None,
        ),
        false,
        mapping::map_bill_of_materials,
    ),
];

/// All known entities in run order
pub fn catalog() -> &'static [EntitySpec] {
    &CATALOG
}

/// Look up an entity by name
pub fn find(name: &str) -> Result<&'static EntitySpec> {
    CATALOG
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| Error::unknown_entity(name))
}

/// Names of all known entities
pub fn names() -> Vec<&'static str> {
    CATALOG.iter().map(|spec| spec.name).collect()
}

/// Resolve a list of names, or the whole catalog when empty
pub fn select(names: &[String]) -> Result<Vec<&'static EntitySpec>> {
    if names.is_empty() {
        return Ok(CATALOG.iter().collect());
    }
    names.iter().map(|name| find(name)).collect()
}
