//! Per-entity mappers
//!
//! Each mapper decodes the upstream payload (already unwrapped from its
//! `data` envelope) and emits staging records keyed by the upstream id.

use super::types::{
    date_value, decode, json_kind, ref_id, require_id, IdRef, StagingRecord, UpstreamId,
};
use crate::error::ItemError;
use crate::types::JsonValue;
use serde::Deserialize;
use serde_json::json;

// ============================================================================
// Company
// ============================================================================

#[derive(Debug, Deserialize)]
struct CompanyPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default)]
    cnpj: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "dataContrato")]
    contract_date: Option<String>,
}

/// Company profile; keyed by id, or by tax id when the profile has no id
pub fn map_company(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let company: CompanyPayload = decode(payload)?;
    let key = match (&company.id, &company.cnpj) {
        (Some(id), _) if !id.is_blank() => id.to_string(),
        (_, Some(cnpj)) if !cnpj.trim().is_empty() => cnpj.trim().to_string(),
        _ => return Err(ItemError::mapping("company has neither id nor cnpj")),
    };

    Ok(vec![StagingRecord::new(
        key,
        json!({
            "id": company.id.as_ref().map(UpstreamId::to_json),
            "name": company.name,
            "tax_id": company.cnpj,
            "email": company.email,
            "contract_date": date_value(&company.contract_date),
        }),
    )])
}

// ============================================================================
// Product Category / Group
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProductCategoryPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "descricao")]
    description: Option<String>,
    #[serde(default, rename = "categoriaPai")]
    parent: Option<IdRef>,
}

/// Product category
pub fn map_product_category(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let category: ProductCategoryPayload = decode(payload)?;
    let id = require_id(&category.id)?;

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "description": category.description,
            "parent_id": ref_id(&category.parent),
        }),
    )])
}

#[derive(Debug, Deserialize)]
struct ProductGroupPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default, rename = "grupoProdutoPai")]
    parent: Option<IdRef>,
}

/// Product group
pub fn map_product_group(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let group: ProductGroupPayload = decode(payload)?;
    let id = require_id(&group.id)?;

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "description": group.name,
            "parent_id": ref_id(&group.parent),
        }),
    )])
}

// ============================================================================
// Product
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Dimensions {
    #[serde(default, rename = "largura")]
    width: Option<f64>,
    #[serde(default, rename = "altura")]
    height: Option<f64>,
    #[serde(default, rename = "profundidade")]
    depth: Option<f64>,
    #[serde(default, rename = "unidadeMedida")]
    unit: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
struct Supplier {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "precoCusto")]
    cost_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Taxation {
    #[serde(default, rename = "grupoProduto")]
    product_group: Option<IdRef>,
    #[serde(default)]
    ncm: Option<String>,
    #[serde(default)]
    cest: Option<String>,
    #[serde(default, rename = "origem")]
    origin: Option<JsonValue>,
    #[serde(default, rename = "spedTipoItem")]
    sped_item_type: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct MediaLink {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaImages {
    #[serde(default, rename = "internas")]
    internal: Vec<MediaLink>,
    #[serde(default, rename = "externas")]
    external: Vec<MediaLink>,
}

#[derive(Debug, Default, Deserialize)]
struct Media {
    #[serde(default, rename = "imagens")]
    images: Option<MediaImages>,
}

#[derive(Debug, Deserialize)]
struct ProductPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default, rename = "codigo")]
    code: Option<String>,
    #[serde(default, rename = "tipo")]
    kind: Option<String>,
    #[serde(default, rename = "situacao")]
    status: Option<String>,
    #[serde(default, rename = "formato")]
    format: Option<String>,
    #[serde(default, rename = "descricaoCurta")]
    short_description: Option<String>,
    #[serde(default, rename = "descricaoComplementar")]
    long_description: Option<String>,
    #[serde(default, rename = "observacoes")]
    notes: Option<String>,
    #[serde(default, rename = "imagemURL")]
    image_url: Option<String>,
    #[serde(default, rename = "dataValidade")]
    expiry_date: Option<String>,
    #[serde(default, rename = "unidade")]
    unit: Option<String>,
    #[serde(default, rename = "itensPorCaixa")]
    items_per_box: Option<f64>,
    #[serde(default)]
    volumes: Option<f64>,
    #[serde(default, rename = "preco")]
    price: Option<f64>,
    #[serde(default, rename = "pesoLiquido")]
    net_weight: Option<f64>,
    #[serde(default, rename = "pesoBruto")]
    gross_weight: Option<f64>,
    #[serde(default, rename = "dimensoes")]
    dimensions: Option<Dimensions>,
    #[serde(default)]
    gtin: Option<String>,
    #[serde(default, rename = "gtinEmbalagem")]
    package_gtin: Option<String>,
    #[serde(default, rename = "tipoProducao")]
    production_type: Option<String>,
    #[serde(default, rename = "condicao")]
    condition: Option<JsonValue>,
    #[serde(default, rename = "marca")]
    brand: Option<String>,
    #[serde(default, rename = "categoria")]
    category: Option<IdRef>,
    #[serde(default, rename = "linhaProduto")]
    product_line: Option<IdRef>,
    #[serde(default, rename = "fornecedor")]
    supplier: Option<Supplier>,
    #[serde(default, rename = "tributacao")]
    taxation: Option<Taxation>,
    #[serde(default, rename = "midia")]
    media: Option<Media>,
    #[serde(default, rename = "dataAlteracao")]
    modified_at: Option<String>,
}

impl ProductPayload {
    /// First internal or external image, falling back to `imagemURL`
    fn first_image(&self) -> Option<String> {
        self.media
            .as_ref()
            .and_then(|m| m.images.as_ref())
            .and_then(|images| images.internal.iter().chain(&images.external).next())
            .and_then(|image| image.link.clone())
            .or_else(|| self.image_url.clone())
    }
}

/// Product detail
pub fn map_product(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let product: ProductPayload = decode(payload)?;
    let id = require_id(&product.id)?;
    let dimensions = product.dimensions.as_ref();
    let supplier = product.supplier.as_ref();
    let taxation = product.taxation.as_ref();

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "name": product.name,
            "code": product.code,
            "kind": product.kind,
            "status": product.status,
            "format": product.format,
            "short_description": product.short_description,
            "long_description": product.long_description,
            "notes": product.notes,
            "image_url": product.first_image(),
            "expiry_date": date_value(&product.expiry_date),
            "unit": product.unit,
            "items_per_box": product.items_per_box,
            "volumes": product.volumes,
            "price": product.price,
            "cost_price": supplier.and_then(|s| s.cost_price),
            "net_weight": product.net_weight,
            "gross_weight": product.gross_weight,
            "width": dimensions.and_then(|d| d.width),
            "height": dimensions.and_then(|d| d.height),
            "depth": dimensions.and_then(|d| d.depth),
            "dimension_unit": dimensions.and_then(|d| d.unit.clone()),
            "gtin": product.gtin,
            "package_gtin": product.package_gtin,
            "production_type": product.production_type,
            "condition": product.condition,
            "brand": product.brand,
            "category_id": ref_id(&product.category),
            "product_line_id": ref_id(&product.product_line),
            "supplier_id": supplier.and_then(|s| s.id.as_ref()).map(UpstreamId::to_json),
            "product_group_id": taxation.map_or(JsonValue::Null, |t| ref_id(&t.product_group)),
            "ncm": taxation.and_then(|t| t.ncm.clone()),
            "cest": taxation.and_then(|t| t.cest.clone()),
            "origin": taxation.and_then(|t| t.origin.clone()),
            "sped_item_type": taxation.and_then(|t| t.sped_item_type.clone()),
            "modified_at": date_value(&product.modified_at),
        }),
    )])
}

// ============================================================================
// Sales Channel
// ============================================================================

#[derive(Debug, Deserialize)]
struct SalesChannelPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "descricao")]
    description: Option<String>,
    #[serde(default, rename = "tipo")]
    kind: Option<String>,
    #[serde(default, rename = "situacao")]
    status: Option<JsonValue>,
}

/// Sales channel
pub fn map_sales_channel(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let channel: SalesChannelPayload = decode(payload)?;
    let id = require_id(&channel.id)?;

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "description": channel.description,
            "kind": channel.kind,
            "status": channel.status,
        }),
    )])
}

// ============================================================================
// Seller
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SellerContact {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default, rename = "situacao")]
    status: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct SellerPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "descontoLimite")]
    discount_limit: Option<f64>,
    #[serde(default, rename = "loja")]
    store: Option<IdRef>,
    #[serde(default, rename = "contato")]
    contact: Option<SellerContact>,
    #[serde(default, rename = "comissoes")]
    commissions: Option<JsonValue>,
}

/// Seller detail
pub fn map_seller(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let seller: SellerPayload = decode(payload)?;
    let id = require_id(&seller.id)?;
    let contact = seller.contact.as_ref();

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "discount_limit": seller.discount_limit,
            "store_id": ref_id(&seller.store),
            "contact_id": contact.and_then(|c| c.id.as_ref()).map(UpstreamId::to_json),
            "contact_name": contact.and_then(|c| c.name.clone()),
            "contact_status": contact.and_then(|c| c.status.clone()),
            "commissions": seller.commissions.unwrap_or_else(|| json!([])),
        }),
    )])
}

// ============================================================================
// Warehouse
// ============================================================================

#[derive(Debug, Deserialize)]
struct WarehousePayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "descricao")]
    description: Option<String>,
    #[serde(default, rename = "situacao")]
    status: Option<JsonValue>,
    #[serde(default, rename = "padrao")]
    is_default: Option<bool>,
    #[serde(default, rename = "desconsiderarSaldo")]
    ignore_balance: Option<bool>,
}

/// Warehouse
pub fn map_warehouse(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let warehouse: WarehousePayload = decode(payload)?;
    let id = require_id(&warehouse.id)?;

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "description": warehouse.description,
            "status": warehouse.status,
            "is_default": warehouse.is_default,
            "ignore_balance": warehouse.ignore_balance,
        }),
    )])
}

// ============================================================================
// Stock Balance
// ============================================================================

#[derive(Debug, Deserialize)]
struct WarehouseBalance {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "saldoFisico")]
    physical: Option<f64>,
    #[serde(default, rename = "saldoVirtual")]
    virtual_balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StockBalancePayload {
    #[serde(default, rename = "produto")]
    product: Option<IdRef>,
    #[serde(default, rename = "depositos")]
    warehouses: Vec<WarehouseBalance>,
}

/// Stock balance of one product, one record per warehouse.
///
/// The payload is the list returned for a single product id; an object is
/// accepted as a one-element list. The natural key is
/// `product_id:warehouse_id`.
pub fn map_stock_balance(
    reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let entries: Vec<StockBalancePayload> = match payload {
        JsonValue::Array(items) => items
            .iter()
            .map(decode::<StockBalancePayload>)
            .collect::<Result<Vec<_>, ItemError>>()?,
        JsonValue::Object(_) => vec![decode(payload)?],
        other => {
            return Err(ItemError::malformed(format!(
                "expected a balance list, got {}",
                json_kind(other)
            )))
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let product_id = entry
            .product
            .as_ref()
            .and_then(|p| p.id.clone())
            .filter(|id| !id.is_blank())
            .unwrap_or_else(|| UpstreamId::Text(reference_id.to_string()));

        for balance in entry.warehouses {
            let Some(warehouse_id) = balance.id.filter(|id| !id.is_blank()) else {
                return Err(ItemError::mapping(format!(
                    "balance for product {product_id} has a warehouse without id"
                )));
            };
            records.push(StagingRecord::new(
                format!("{product_id}:{warehouse_id}"),
                json!({
                    "product_id": product_id.to_json(),
                    "warehouse_id": warehouse_id.to_json(),
                    "physical_balance": balance.physical,
                    "virtual_balance": balance.virtual_balance,
                }),
            ));
        }
    }
    Ok(records)
}

// ============================================================================
// Sales Order
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct OrderContact {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default, rename = "tipoPessoa")]
    person_type: Option<String>,
    #[serde(default, rename = "numeroDocumento")]
    document: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderStatus {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "valor")]
    value: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderDiscount {
    #[serde(default, rename = "valor")]
    value: Option<f64>,
    #[serde(default, rename = "unidade")]
    unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderTaxation {
    #[serde(default, rename = "totalICMS")]
    total_icms: Option<f64>,
    #[serde(default, rename = "totalIPI")]
    total_ipi: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Intermediary {
    #[serde(default)]
    cnpj: Option<String>,
    #[serde(default, rename = "nomeUsuario")]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SalesOrderPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "numero")]
    number: Option<JsonValue>,
    #[serde(default, rename = "numeroLoja")]
    store_number: Option<String>,
    #[serde(default, rename = "data")]
    order_date: Option<String>,
    #[serde(default, rename = "dataSaida")]
    ship_date: Option<String>,
    #[serde(default, rename = "dataPrevista")]
    expected_date: Option<String>,
    #[serde(default, rename = "totalProdutos")]
    products_total: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default, rename = "contato")]
    contact: Option<OrderContact>,
    #[serde(default, rename = "situacao")]
    status: Option<OrderStatus>,
    #[serde(default, rename = "loja")]
    store: Option<IdRef>,
    #[serde(default, rename = "numeroPedidoCompra")]
    purchase_order_number: Option<String>,
    #[serde(default, rename = "outrasDespesas")]
    other_expenses: Option<f64>,
    #[serde(default, rename = "observacoes")]
    notes: Option<String>,
    #[serde(default, rename = "observacoesInternas")]
    internal_notes: Option<String>,
    #[serde(default, rename = "desconto")]
    discount: Option<OrderDiscount>,
    #[serde(default, rename = "categoria")]
    financial_category: Option<IdRef>,
    #[serde(default, rename = "notaFiscal")]
    invoice: Option<IdRef>,
    #[serde(default, rename = "tributacao")]
    taxation: Option<OrderTaxation>,
    #[serde(default, rename = "itens")]
    items: Option<JsonValue>,
    #[serde(default, rename = "parcelas")]
    installments: Option<JsonValue>,
    #[serde(default, rename = "transporte")]
    shipping: Option<JsonValue>,
    #[serde(default, rename = "taxas")]
    fees: Option<JsonValue>,
    #[serde(default, rename = "vendedor")]
    seller: Option<IdRef>,
    #[serde(default, rename = "intermediador")]
    intermediary: Option<Intermediary>,
}

/// Sales order detail; nested collections are kept as JSON
pub fn map_sales_order(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let order: SalesOrderPayload = decode(payload)?;
    let id = require_id(&order.id)?;
    let contact = order.contact.as_ref();
    let status = order.status.as_ref();
    let discount = order.discount.as_ref();
    let taxation = order.taxation.as_ref();
    let intermediary = order.intermediary.as_ref();

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "number": order.number,
            "store_number": order.store_number,
            "order_date": date_value(&order.order_date),
            "ship_date": date_value(&order.ship_date),
            "expected_date": date_value(&order.expected_date),
            "products_total": order.products_total,
            "total": order.total,
            "contact_id": contact.and_then(|c| c.id.as_ref()).map(UpstreamId::to_json),
            "contact_name": contact.and_then(|c| c.name.clone()),
            "contact_person_type": contact.and_then(|c| c.person_type.clone()),
            "contact_document": contact.and_then(|c| c.document.clone()),
            "status_id": status.and_then(|s| s.id.as_ref()).map(UpstreamId::to_json),
            "status_value": status.and_then(|s| s.value.clone()),
            "store_id": ref_id(&order.store),
            "purchase_order_number": order.purchase_order_number,
            "other_expenses": order.other_expenses,
            "notes": order.notes,
            "internal_notes": order.internal_notes,
            "discount_value": discount.and_then(|d| d.value),
            "discount_unit": discount.and_then(|d| d.unit.clone()),
            "financial_category_id": ref_id(&order.financial_category),
            "invoice_id": ref_id(&order.invoice),
            "total_icms": taxation.and_then(|t| t.total_icms),
            "total_ipi": taxation.and_then(|t| t.total_ipi),
            "items": order.items.unwrap_or_else(|| json!([])),
            "installments": order.installments.unwrap_or_else(|| json!([])),
            "shipping": order.shipping.unwrap_or_else(|| json!({})),
            "fees": order.fees.unwrap_or_else(|| json!({})),
            "seller_id": ref_id(&order.seller),
            "intermediary_tax_id": intermediary.and_then(|i| i.cnpj.clone()),
            "intermediary_username": intermediary.and_then(|i| i.username.clone()),
        }),
    )])
}

// ============================================================================
// Contact
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Address {
    #[serde(default, rename = "endereco")]
    street: Option<String>,
    #[serde(default, rename = "numero")]
    number: Option<String>,
    #[serde(default, rename = "bairro")]
    district: Option<String>,
    #[serde(default, rename = "municipio")]
    city: Option<String>,
    #[serde(default)]
    uf: Option<String>,
    #[serde(default)]
    cep: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactAddresses {
    #[serde(default, rename = "geral")]
    general: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct ContactPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "nome")]
    name: Option<String>,
    #[serde(default, rename = "codigo")]
    code: Option<String>,
    #[serde(default, rename = "situacao")]
    status: Option<String>,
    #[serde(default, rename = "numeroDocumento")]
    document: Option<String>,
    #[serde(default, rename = "tipo")]
    person_type: Option<String>,
    #[serde(default, rename = "telefone")]
    phone: Option<String>,
    #[serde(default, rename = "celular")]
    mobile: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "endereco")]
    address: Option<ContactAddresses>,
}

/// Contact detail (customers and suppliers)
pub fn map_contact(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let contact: ContactPayload = decode(payload)?;
    let id = require_id(&contact.id)?;
    let address = contact.address.as_ref().and_then(|a| a.general.as_ref());

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "name": contact.name,
            "code": contact.code,
            "status": contact.status,
            "document": contact.document,
            "person_type": contact.person_type,
            "phone": contact.phone,
            "mobile": contact.mobile,
            "email": contact.email,
            "street": address.and_then(|a| a.street.clone()),
            "street_number": address.and_then(|a| a.number.clone()),
            "district": address.and_then(|a| a.district.clone()),
            "city": address.and_then(|a| a.city.clone()),
            "state": address.and_then(|a| a.uf.clone()),
            "postal_code": address.and_then(|a| a.cep.clone()),
        }),
    )])
}

// ============================================================================
// Financial Category
// ============================================================================

#[derive(Debug, Deserialize)]
struct FinancialCategoryPayload {
    #[serde(default)]
    id: Option<UpstreamId>,
    #[serde(default, rename = "idCategoriaPai")]
    parent_id: Option<UpstreamId>,
    #[serde(default, rename = "descricao")]
    description: Option<String>,
    #[serde(default, rename = "tipo")]
    kind: Option<JsonValue>,
}

/// Revenue/expense category
pub fn map_financial_category(
    _reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let category: FinancialCategoryPayload = decode(payload)?;
    let id = require_id(&category.id)?;

    Ok(vec![StagingRecord::new(
        id.to_string(),
        json!({
            "id": id.to_json(),
            "parent_id": category
                .parent_id
                .as_ref()
                .filter(|p| !p.is_blank())
                .map(UpstreamId::to_json),
            "description": category.description,
            "kind": category.kind,
        }),
    )])
}

// ============================================================================
// Bill of Materials
// ============================================================================

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(default, rename = "produto")]
    product: Option<IdRef>,
    #[serde(default, rename = "quantidade")]
    quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BillOfMaterialsPayload {
    #[serde(default, rename = "tipoEstoque")]
    stock_type: Option<String>,
    #[serde(default, rename = "lancamentoEstoque")]
    stock_posting: Option<String>,
    #[serde(default, rename = "componentes")]
    components: Vec<Component>,
}

/// Product structure, one record per component keyed
/// `product_id:component_id`
pub fn map_bill_of_materials(
    reference_id: &str,
    payload: &JsonValue,
) -> Result<Vec<StagingRecord>, ItemError> {
    let structure: BillOfMaterialsPayload = decode(payload)?;

    structure
        .components
        .iter()
        .map(|component| -> Result<StagingRecord, ItemError> {
            let component_id = component
                .product
                .as_ref()
                .and_then(|p| p.id.as_ref())
                .filter(|id| !id.is_blank())
                .ok_or_else(|| {
                    ItemError::mapping(format!(
                        "structure of product {reference_id} has a component without id"
                    ))
                })?;
            Ok(StagingRecord::new(
                format!("{reference_id}:{component_id}"),
                json!({
                    "product_id": reference_id,
                    "component_id": component_id.to_json(),
                    "quantity": component.quantity,
                    "stock_type": structure.stock_type,
                    "stock_posting": structure.stock_posting,
                }),
            ))
        })
        .collect()
}
