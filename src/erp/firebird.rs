//! [`Erp`] over the Firebird connection pool. All ERP SQL lives here.

use async_trait::async_trait;
use feira_firebird::{Connector, FirebirdConnector, Pool, Row, RowError, Value};
use tracing::debug;

use super::catalog::{group_name, section_name, PRODUCE_SECTION};
use super::model::*;
use super::{Erp, ErpError};

/// ERP access through a bounded pool of Firebird connections.
pub struct FirebirdErp<C: Connector = FirebirdConnector> {
    pool: Pool<C>,
}

impl<C: Connector> std::fmt::Debug for FirebirdErp<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebirdErp").field("pool", &self.pool).finish()
    }
}

impl<C: Connector> FirebirdErp<C> {
    /// Wrap an existing pool.
    pub fn new(pool: Pool<C>) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    async fn fetch<T>(
        &self,
        sql: &str,
        params: Vec<Value>,
        map: impl Fn(&Row) -> Result<T, RowError>,
    ) -> Result<Vec<T>, ErpError> {
        let rows = self.pool.query(sql, params).await?;
        debug!(rows = rows.len(), "ERP query returned");
        rows.iter()
            .map(|row| map(row).map_err(ErpError::from))
            .collect()
    }
}

// ── SQL ─────────────────────────────────────────────────────────

const REPLACEMENT_COSTS_SQL: &str = "
    SELECT P.CODIGO AS CODIGO, P.DESCRICAO, PP.F_CUSTO_REPOSICAO, PP.CODIGO_FILIAL
    FROM PRODUTO_PARAMETROS PP
    JOIN PRODUTO P ON P.CODIGO = PP.CODIGO_PRODUTO
    WHERE PP.CODIGO_FILIAL IN ({branches}) AND PP.F_CUSTO_REPOSICAO IS NOT NULL
    ORDER BY P.CODIGO";

const STOCK_SQL: &str = "
    SELECT
        P.CODIGO AS CODIGO_PRODUTO,
        P.DESCRICAO,
        (SELECT SUM(EP.ESTOQUE) FROM ESTOQUE_PRODUTO EP
          WHERE EP.CODIGO_PRODUTO = P.CODIGO) AS ESTOQUE,
        PP.CODIGO_FILIAL AS TIPO_ESTOQUE,
        P.COD_FORNECEDOR AS CODIGO_FORNECEDOR,
        (SELECT F.RAZAO_SOCIAL FROM FORNECEDOR F WHERE F.CODIGO = P.COD_FORNECEDOR) AS FORNECEDOR,
        P.COD_SECAO,
        P.COD_GRUPO
    FROM PRODUTO P
    JOIN PRODUTO_PARAMETROS PP ON P.CODIGO = PP.CODIGO_PRODUTO
    WHERE 1=1";

const FISCAL_SQL: &str = "
    SELECT CFOP, DATA, TOTAL, VALOR_ICMS, VALOR_PIS, VALOR_COFINS FROM (
        SELECT
            CAST(EI.CODIGO_CFOP AS VARCHAR(4)) AS CFOP,
            CAST(E.DATA_ENTRADA AS TIMESTAMP) AS DATA,
            CAST((EI.QUANTIDADE * EI.VALOR_UNITARIO) AS NUMERIC(15, 2)) AS TOTAL,
            CAST(COALESCE(EI.F_NOTA_VALOR_ICMS, 0) AS NUMERIC(15, 2)) AS VALOR_ICMS,
            CAST(COALESCE(EI.F_VALOR_TOTAL_PIS, 0) AS NUMERIC(15, 2)) AS VALOR_PIS,
            CAST(COALESCE(EI.F_VALOR_TOTAL_COFINS, 0) AS NUMERIC(15, 2)) AS VALOR_COFINS
        FROM ENTRADA_ITEM EI
        JOIN ENTRADA E ON EI.CODIGO_ENTRADA = E.CODIGO
        WHERE EI.CODIGO_CFOP IS NOT NULL

        UNION ALL

        SELECT
            CAST(SDI.CODIGO_CFOP AS VARCHAR(4)),
            CAST(SD.DATA_ENT_SAI AS TIMESTAMP),
            CAST(SDI.VALOR_TOTAL AS NUMERIC(15, 2)),
            CAST(COALESCE(SDI.VALOR_ICMS, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(SDI.VALOR_PIS, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(SDI.VALOR_COFINS, 0) AS NUMERIC(15, 2))
        FROM SPED_DESPESA_ITEM SDI
        JOIN SPED_DESPESA SD ON SDI.CODIGO_SPED_DESPESA = SD.CODIGO
        WHERE SDI.CODIGO_CFOP IS NOT NULL

        UNION ALL

        SELECT
            CAST(COALESCE(NFI.CODIGO_CFOP, NF.CODIGO_CFOP) AS VARCHAR(4)),
            CAST(NF.DATA_EMISSAO AS TIMESTAMP),
            CAST(COALESCE(NFI.NFE_VALOR_TOTAL, NFI.VALOR_TOTAL) AS NUMERIC(15, 2)),
            CAST(COALESCE(NFI.NFE_VALOR_ICMS, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(NFI.NFE_VALOR_PIS, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(NFI.NFE_VALOR_COFINS, 0) AS NUMERIC(15, 2))
        FROM NOTA_FISCAL_ITEM NFI
        JOIN NOTA_FISCAL NF ON NFI.CODIGO_NF = NF.CODIGO
        WHERE COALESCE(NFI.CODIGO_CFOP, NF.CODIGO_CFOP) IS NOT NULL

        UNION ALL

        SELECT
            CAST(DFI.CFOP_I08 AS VARCHAR(4)),
            CAST(DF.DHEMI_B09 AS TIMESTAMP),
            CAST(DFI.VPROD_I11 AS NUMERIC(15, 2)),
            CAST(COALESCE(DFI.VICMS_N17, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(DFI.VPIS_Q09, 0) AS NUMERIC(15, 2)),
            CAST(COALESCE(DFI.VCOFINS_S11, 0) AS NUMERIC(15, 2))
        FROM DOC_FISCAL_ITEM DFI
        JOIN DOC_FISCAL DF ON DFI.CODIGO_DOC_FISCAL = DF.CODIGO
        WHERE DFI.CFOP_I08 IS NOT NULL AND DF.STATUS NOT IN ('CSL', 'CAS', 'NTR')
    )
    WHERE DATA BETWEEN ? AND ?";

const PRICE_TABLE_SQL: &str = "
    SELECT
        CCP.CODIGO_PRODUTO,
        P.DESCRICAO,
        CCP.PRECO_FIXO,
        PP.F_CUSTO_REPOSICAO,
        CCP.CODIGO_CLIENTE_CONVENIO,
        (SELECT MAX(OI.DATA_INCLUSAO) FROM ORCAMENTO_ITEM OI
          JOIN ORCAMENTO O ON O.CODIGO = OI.CODIGO_ORCAMENTO
          WHERE O.CODIGO_CLIENTE = CCP.CODIGO_CLIENTE_CONVENIO
            AND OI.CODIGO_PRODUTO = CCP.CODIGO_PRODUTO) AS DATA_ULTIMA_COMPRA
    FROM CLIENTE_CONVENIO_PRODUTO CCP
    LEFT JOIN PRODUTO P ON P.CODIGO = CCP.CODIGO_PRODUTO
    LEFT JOIN PRODUTO_PARAMETROS PP ON PP.CODIGO_PRODUTO = CCP.CODIGO_PRODUTO
    WHERE CCP.CODIGO_CLIENTE_CONVENIO = ? AND PP.CODIGO_FILIAL = ?
    ORDER BY CCP.CODIGO_PRODUTO";

const SALES_SQL: &str = "
    SELECT
        O.CODIGO,
        O.CODIGO_CLIENTE,
        CAST(C.NOME AS VARCHAR(100)) AS NOME_CLIENTE,
        CAST(C.APELIDO AS VARCHAR(100)) AS APELIDO_CLIENTE,
        O.DATA_ORCAMENTO,
        O.USUARIO,
        O.CODIGO_FUNCIONARIO AS CODIGO_VENDEDOR,
        O.CODIGO_FILIAL,
        O.ORCAMENTO_BRUTO,
        O.ORCAMENTO_LIQUIDO,
        O.STATUS,
        (SELECT FIRST 1 OI.SITUACAO_ENTREGA FROM ORCAMENTO_ITEM OI
          WHERE OI.CODIGO_ORCAMENTO = O.CODIGO) AS SITUACAO_ENTREGA
    FROM ORCAMENTO O
    LEFT JOIN CLIENTE C ON C.CODIGO = O.CODIGO_CLIENTE
    WHERE 1=1";

const SALE_ITEMS_SQL: &str = "
    SELECT
        OI.SEQUENCIA,
        OI.CODIGO_PRODUTO,
        CAST(OI.PAF_DESCRICAO_PRODUTO AS VARCHAR(255)) AS PAF_DESCRICAO_PRODUTO,
        OI.QUANTIDADE,
        OI.PRECO_UNITARIO,
        COALESCE(OI.DESCONTO_VALOR, 0) AS DESCONTO_VALOR,
        OI.VALOR_TOTAL,
        OI.CUSTO_REPOSICAO
    FROM ORCAMENTO_ITEM OI
    WHERE OI.CODIGO_ORCAMENTO = ?
    ORDER BY OI.SEQUENCIA ASC";

const SALE_NOTE_SQL: &str =
    "SELECT CAST(O.OBSERVACAO AS VARCHAR(255)) AS OBSERVACAO FROM ORCAMENTO O WHERE O.CODIGO = ?";

const SALE_OWNER_SQL: &str = "SELECT CODIGO_CLIENTE FROM ORCAMENTO WHERE CODIGO = ?";

const PURCHASE_LINES_SQL: &str = "
    SELECT
        OI.CODIGO_PRODUTO,
        CAST(OI.PAF_DESCRICAO_PRODUTO AS VARCHAR(255)) AS PAF_DESCRICAO_PRODUTO,
        OI.QUANTIDADE,
        OI.DATA_PREVISAO_ENTREGA,
        P.FRACAO_COMPRA3,
        PP.F_CUSTO_REPOSICAO
    FROM ORCAMENTO_ITEM OI
    LEFT JOIN ORCAMENTO O ON OI.CODIGO_ORCAMENTO = O.CODIGO
    LEFT JOIN PRODUTO P ON OI.CODIGO_PRODUTO = P.CODIGO
    LEFT JOIN PRODUTO_PARAMETROS PP
        ON P.CODIGO = PP.CODIGO_PRODUTO AND PP.CODIGO_FILIAL = O.CODIGO_FILIAL
    WHERE OI.DATA_PREVISAO_ENTREGA BETWEEN ? AND ?";

const PURCHASE_DETAILS_SQL: &str = "
    SELECT
        O.CODIGO AS CODIGO_ORCAMENTO,
        CAST(O.OBSERVACAO AS VARCHAR(255)) AS OBSERVACAO,
        C.RAZAO_SOCIAL AS NOME_CLIENTE,
        OI.QUANTIDADE,
        OI.CUSTO_REPOSICAO,
        OI.VALOR_TOTAL
    FROM ORCAMENTO_ITEM OI
    JOIN ORCAMENTO O ON OI.CODIGO_ORCAMENTO = O.CODIGO
    JOIN CLIENTE C ON O.CODIGO_CLIENTE = C.CODIGO
    WHERE OI.CODIGO_PRODUTO = ? AND OI.DATA_PREVISAO_ENTREGA BETWEEN ? AND ?";

const SEARCH_CLIENTS_SQL: &str = "
    SELECT CODIGO, NOME, RAZAO_SOCIAL, CNPJ
    FROM CLIENTE
    WHERE CAST(CODIGO AS VARCHAR(255)) LIKE ?
       OR UPPER(NOME) LIKE UPPER(?)
       OR UPPER(RAZAO_SOCIAL) LIKE UPPER(?)
       OR CNPJ LIKE ?";

const CLIENT_ADDRESSES_SQL: &str = "
    SELECT
        C.CODIGO,
        C.NOME,
        C.RAZAO_SOCIAL,
        COALESCE(C.ENT_ENDERECO, C.ENDERECO) AS ENDERECO,
        COALESCE(C.ENT_NUMERO, C.NUMERO) AS NUMERO,
        COALESCE(C.ENT_BAIRRO, C.BAIRRO) AS BAIRRO,
        COALESCE(CID_ENT.NOME, CID.NOME) AS CIDADE,
        COALESCE(C.ENT_UF, C.UF) AS UF,
        COALESCE(C.ENT_CEP, C.CEP) AS CEP
    FROM CLIENTE C
    LEFT JOIN CIDADE_VILA CID ON C.COD_CIDADE = CID.CODIGO
    LEFT JOIN CIDADE_VILA CID_ENT ON C.ENT_COD_CIDADE = CID_ENT.CODIGO
    WHERE (C.ENT_ENDERECO IS NOT NULL AND C.ENT_COD_CIDADE IS NOT NULL)
       OR (C.ENDERECO IS NOT NULL AND C.COD_CIDADE IS NOT NULL)";

const CLIENT_AGREEMENT_SQL: &str =
    "SELECT CONVENIO_DESCONTO, APELIDO FROM CLIENTE WHERE CODIGO = ?";

const RECEIVABLES_SQL: &str = "
    SELECT
        CR.CODIGO,
        CR.CODIGO_CLIENTE,
        C.NOME AS NOME_CLIENTE,
        CR.CODIGO_VENDA AS DAV,
        CR.DATA_EMISSAO,
        CR.DATA_VENCIMENTO,
        CR.STATUS,
        CR.VALOR_NOMINAL,
        CR.VALOR_ABERTO,
        CAST(CR.OBSERVACAO AS VARCHAR(255)) AS OBSERVACAO,
        CR.CODIGO_FILIAL,
        CR.BLOQUETO_NOSSONUMERO
    FROM CONTAS_RECEBER CR
    LEFT JOIN CLIENTE C ON CR.CODIGO_CLIENTE = C.CODIGO";

const SALE_PRICES_SQL: &str = "
    SELECT
        P.CODIGO,
        P.DESCRICAO,
        P.COD_SECAO,
        P.COD_GRUPO,
        PP.F_CUSTO_REPOSICAO,
        PP.PRECO_VENDA,
        PP.CODIGO_FILIAL
    FROM PRODUTO P
    JOIN PRODUTO_PARAMETROS PP ON P.CODIGO = PP.CODIGO_PRODUTO
    WHERE P.STATUS = 'A'";

const AVAILABLE_PRODUCTS_SQL: &str = "
    SELECT P.CODIGO, P.DESCRICAO, P.TIPO_PRODUTO, PP.PRECO_VENDA
    FROM PRODUTO_PARAMETROS PP
    JOIN PRODUTO P ON PP.CODIGO_PRODUTO = P.CODIGO
    WHERE PP.CODIGO_FILIAL = ? AND P.COD_SECAO = ?
    ORDER BY P.DESCRICAO";

const TOP_PRODUCTS_SQL: &str = "
    SELECT FIRST 10
        OI.CODIGO_PRODUTO,
        MAX(OI.PAF_DESCRICAO_PRODUTO) AS NOME_PRODUTO,
        SUM(OI.QUANTIDADE) AS QUANTIDADE_TOTAL
    FROM ORCAMENTO_ITEM OI
    JOIN ORCAMENTO O ON OI.CODIGO_ORCAMENTO = O.CODIGO
    WHERE O.CODIGO_CLIENTE = ?
    GROUP BY OI.CODIGO_PRODUTO
    ORDER BY 3 DESC";

const SEARCH_SALES_SQL: &str = "
    SELECT FIRST 10 O.CODIGO, C.NOME AS NOME_CLIENTE, O.DATA_ORCAMENTO
    FROM ORCAMENTO O
    LEFT JOIN CLIENTE C ON O.CODIGO_CLIENTE = C.CODIGO
    WHERE CAST(O.CODIGO AS VARCHAR(20)) LIKE ?
    ORDER BY O.CODIGO DESC";

// ── Row mapping ─────────────────────────────────────────────────

fn replacement_cost(row: &Row) -> Result<ReplacementCost, RowError> {
    Ok(ReplacementCost {
        codigo: row.i64("CODIGO")?,
        descricao: row.opt_string("DESCRICAO")?,
        f_custo_reposicao: row.opt_f64("F_CUSTO_REPOSICAO")?,
        codigo_filial: row.i64("CODIGO_FILIAL")?,
    })
}

fn stock_level(row: &Row) -> Result<StockLevel, RowError> {
    let branch = row.opt_i64("TIPO_ESTOQUE")?.and_then(Branch::from_code);
    Ok(StockLevel {
        codigo_produto: row.i64("CODIGO_PRODUTO")?,
        descricao: row.opt_string("DESCRICAO")?,
        estoque: row.f64_or_zero("ESTOQUE")?,
        tipo_estoque: if branch == Some(Branch::Matriz) {
            Branch::Matriz.label()
        } else {
            Branch::Filial.label()
        },
        codigo_fornecedor: row.opt_i64("CODIGO_FORNECEDOR")?,
        fornecedor: row.opt_string("FORNECEDOR")?,
        cod_secao: row.opt_i64("COD_SECAO")?,
        cod_grupo: row.opt_i64("COD_GRUPO")?,
    })
}

fn fiscal_operation(row: &Row) -> Result<FiscalOperation, RowError> {
    Ok(FiscalOperation {
        cfop: row.opt_string("CFOP")?,
        data: row.opt_timestamp("DATA")?,
        total: row.f64_or_zero("TOTAL")?,
        valor_icms: row.f64_or_zero("VALOR_ICMS")?,
        valor_pis: row.f64_or_zero("VALOR_PIS")?,
        valor_cofins: row.f64_or_zero("VALOR_COFINS")?,
    })
}

fn price_table_entry(row: &Row) -> Result<PriceTableEntry, RowError> {
    Ok(PriceTableEntry {
        codigo_produto: row.i64("CODIGO_PRODUTO")?,
        descricao: row.opt_string("DESCRICAO")?,
        preco_fixo: row.opt_f64("PRECO_FIXO")?,
        f_custo_reposicao: row.opt_f64("F_CUSTO_REPOSICAO")?,
        codigo_cliente_convenio: row.i64("CODIGO_CLIENTE_CONVENIO")?,
        data_ultima_compra: row.opt_date("DATA_ULTIMA_COMPRA")?,
    })
}

fn sale_summary(row: &Row) -> Result<SaleSummary, RowError> {
    Ok(SaleSummary {
        codigo: row.i64("CODIGO")?,
        codigo_cliente: row.opt_i64("CODIGO_CLIENTE")?,
        nome_cliente: row.opt_string("NOME_CLIENTE")?,
        apelido_cliente: row.opt_string("APELIDO_CLIENTE")?,
        data_orcamento: row.opt_date("DATA_ORCAMENTO")?,
        usuario: row.opt_string("USUARIO")?,
        codigo_vendedor: row.opt_i64("CODIGO_VENDEDOR")?,
        codigo_filial: row.opt_i64("CODIGO_FILIAL")?,
        orcamento_bruto: row.opt_f64("ORCAMENTO_BRUTO")?,
        orcamento_liquido: row.opt_f64("ORCAMENTO_LIQUIDO")?,
        status: row.opt_string("STATUS")?,
        situacao_entrega: row.opt_string("SITUACAO_ENTREGA")?,
    })
}

fn sale_item(row: &Row) -> Result<SaleItem, RowError> {
    Ok(SaleItem {
        sequencia: row.opt_i64("SEQUENCIA")?,
        codigo_produto: row.opt_i64("CODIGO_PRODUTO")?,
        paf_descricao_produto: row.opt_string("PAF_DESCRICAO_PRODUTO")?,
        quantidade: row.f64_or_zero("QUANTIDADE")?,
        preco_unitario: row.opt_f64("PRECO_UNITARIO")?,
        desconto_valor: row.f64_or_zero("DESCONTO_VALOR")?,
        valor_total: row.opt_f64("VALOR_TOTAL")?,
        custo_reposicao: row.opt_f64("CUSTO_REPOSICAO")?,
    })
}

fn purchase_line(row: &Row) -> Result<PurchaseLine, RowError> {
    Ok(PurchaseLine {
        codigo_produto: row.i64("CODIGO_PRODUTO")?,
        paf_descricao_produto: row.opt_string("PAF_DESCRICAO_PRODUTO")?,
        quantidade: row.f64_or_zero("QUANTIDADE")?,
        data_previsao_entrega: row.opt_date("DATA_PREVISAO_ENTREGA")?,
        fracao_compra3: row.opt_f64("FRACAO_COMPRA3")?,
        f_custo_reposicao: row.opt_f64("F_CUSTO_REPOSICAO")?,
    })
}

fn purchase_detail(row: &Row) -> Result<PurchaseDetail, RowError> {
    let quantidade = row.f64_or_zero("QUANTIDADE")?;
    let valor_total = row.opt_f64("VALOR_TOTAL")?;
    Ok(PurchaseDetail {
        codigo_orcamento: row.i64("CODIGO_ORCAMENTO")?,
        observacao: row.opt_string("OBSERVACAO")?,
        nome_cliente: row.opt_string("NOME_CLIENTE")?,
        quantidade,
        custo_reposicao: row.opt_f64("CUSTO_REPOSICAO")?,
        valor_total,
        valor_unitario: PurchaseDetail::unit_value(valor_total, quantidade),
    })
}

fn client_match(row: &Row) -> Result<ClientMatch, RowError> {
    Ok(ClientMatch {
        codigo: row.i64("CODIGO")?,
        nome: row.opt_string("NOME")?,
        razao_social: row.opt_string("RAZAO_SOCIAL")?,
        cnpj: row.opt_string("CNPJ")?,
    })
}

fn client_address(row: &Row) -> Result<ClientAddress, RowError> {
    Ok(ClientAddress {
        codigo: row.i64("CODIGO")?,
        nome: row.opt_string("NOME")?,
        razao_social: row.opt_string("RAZAO_SOCIAL")?,
        endereco: row.opt_string("ENDERECO")?,
        numero: row.opt_string("NUMERO")?,
        bairro: row.opt_string("BAIRRO")?,
        cidade: row.opt_string("CIDADE")?,
        uf: row.opt_string("UF")?,
        cep: row.opt_string("CEP")?,
    })
}

fn receivable(row: &Row) -> Result<Receivable, RowError> {
    Ok(Receivable {
        codigo: row.i64("CODIGO")?,
        codigo_cliente: row.opt_i64("CODIGO_CLIENTE")?,
        nome_cliente: row.opt_string("NOME_CLIENTE")?,
        dav: row.opt_i64("DAV")?,
        data_emissao: row.opt_date("DATA_EMISSAO")?,
        data_vencimento: row.opt_date("DATA_VENCIMENTO")?,
        status: row.opt_string("STATUS")?,
        valor_nominal: row.opt_f64("VALOR_NOMINAL")?,
        valor_aberto: row.opt_f64("VALOR_ABERTO")?,
        observacao: row.opt_string("OBSERVACAO")?,
        codigo_filial: row.opt_i64("CODIGO_FILIAL")?,
        bloqueto_nossonumero: row.opt_string("BLOQUETO_NOSSONUMERO")?,
    })
}

fn sale_price(row: &Row) -> Result<SalePrice, RowError> {
    let cod_secao = row.opt_i64("COD_SECAO")?;
    let cod_grupo = row.opt_i64("COD_GRUPO")?;
    Ok(SalePrice {
        codigo: row.i64("CODIGO")?,
        descricao: row.opt_string("DESCRICAO")?,
        cod_secao,
        cod_grupo,
        f_custo_reposicao: row.opt_f64("F_CUSTO_REPOSICAO")?,
        preco_venda: row.opt_f64("PRECO_VENDA")?,
        codigo_filial: row.opt_i64("CODIGO_FILIAL")?,
        secao_descricao: section_name(cod_secao),
        grupo_descricao: group_name(cod_grupo),
    })
}

fn available_product(row: &Row) -> Result<AvailableProduct, RowError> {
    Ok(AvailableProduct {
        codigo: row.i64("CODIGO")?,
        descricao: row.opt_string("DESCRICAO")?,
        preco_venda: row.opt_f64("PRECO_VENDA")?,
        tipo_produto: row.opt_string("TIPO_PRODUTO")?,
    })
}

fn top_product(row: &Row) -> Result<TopProduct, RowError> {
    Ok(TopProduct {
        codigo_produto: row.i64("CODIGO_PRODUTO")?,
        nome_produto: row.opt_string("NOME_PRODUTO")?,
        quantidade_total: row.f64_or_zero("QUANTIDADE_TOTAL")?,
    })
}

fn sale_search_hit(row: &Row) -> Result<SaleSearchHit, RowError> {
    Ok(SaleSearchHit {
        codigo: row.i64("CODIGO")?,
        nome_cliente: row.opt_string("NOME_CLIENTE")?,
        data_orcamento: row.opt_date("DATA_ORCAMENTO")?,
    })
}

fn contains_pattern(term: &str) -> Value {
    Value::Text(format!("%{}%", term.trim()))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ── Erp impl ────────────────────────────────────────────────────

#[async_trait]
impl<C: Connector> Erp for FirebirdErp<C> {
    async fn check(&self) -> Result<(), ErpError> {
        self.pool.check().await?;
        Ok(())
    }

    async fn replacement_costs(
        &self,
        branches: &[Branch],
    ) -> Result<Vec<ReplacementCost>, ErpError> {
        if branches.is_empty() {
            return Ok(Vec::new());
        }
        let sql = REPLACEMENT_COSTS_SQL.replace("{branches}", &placeholders(branches.len()));
        let params = branches.iter().map(|b| Value::Int(b.code())).collect();
        self.fetch(&sql, params, replacement_cost).await
    }

    async fn stock(&self, filter: &StockFilter) -> Result<Vec<StockLevel>, ErpError> {
        let mut sql = String::from(STOCK_SQL);
        let mut params = Vec::new();
        if let Some(branch) = filter.branch {
            sql.push_str(" AND PP.CODIGO_FILIAL = ?");
            params.push(Value::Int(branch.code()));
        }
        if filter.only_negative {
            sql.push_str(
                " AND (SELECT SUM(EP.ESTOQUE) FROM ESTOQUE_PRODUTO EP
                        WHERE EP.CODIGO_PRODUTO = P.CODIGO) < 0",
            );
        }
        let column = match filter.order.field {
            StockSortField::Codigo => "P.CODIGO",
            StockSortField::Descricao => "P.DESCRICAO",
            StockSortField::Estoque => "ESTOQUE",
        };
        let direction = if filter.order.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {column} {direction}"));
        self.fetch(&sql, params, stock_level).await
    }

    async fn fiscal_operations(
        &self,
        range: DateRange,
    ) -> Result<Vec<FiscalOperation>, ErpError> {
        let (start, end) = range.bounds();
        self.fetch(FISCAL_SQL, vec![start.into(), end.into()], fiscal_operation)
            .await
    }

    async fn client_price_table(
        &self,
        client: i64,
        branch: Branch,
    ) -> Result<Vec<PriceTableEntry>, ErpError> {
        self.fetch(
            PRICE_TABLE_SQL,
            vec![client.into(), branch.code().into()],
            price_table_entry,
        )
        .await
    }

    async fn sales_summary(&self, filter: &SalesFilter) -> Result<Vec<SaleSummary>, ErpError> {
        let mut sql = String::from(SALES_SQL);
        let mut params = Vec::new();
        for client in [filter.client, filter.scope].into_iter().flatten() {
            sql.push_str(" AND O.CODIGO_CLIENTE = ?");
            params.push(Value::Int(client));
        }
        if let Some(order) = filter.order {
            sql.push_str(" AND O.CODIGO = ?");
            params.push(Value::Int(order));
        }
        sql.push_str(" ORDER BY O.DATA_ORCAMENTO DESC, O.CODIGO DESC");
        self.fetch(&sql, params, sale_summary).await
    }

    async fn sale_items(&self, order: i64) -> Result<Vec<SaleItem>, ErpError> {
        self.fetch(SALE_ITEMS_SQL, vec![order.into()], sale_item).await
    }

    async fn sale_note(&self, order: i64) -> Result<Option<String>, ErpError> {
        let notes = self
            .fetch(SALE_NOTE_SQL, vec![order.into()], |row| {
                row.opt_string("OBSERVACAO")
            })
            .await?;
        Ok(notes.into_iter().next().flatten())
    }

    async fn sale_owner(&self, order: i64) -> Result<Option<i64>, ErpError> {
        let owners = self
            .fetch(SALE_OWNER_SQL, vec![order.into()], |row| {
                row.opt_i64("CODIGO_CLIENTE")
            })
            .await?;
        Ok(owners.into_iter().next().flatten())
    }

    async fn purchase_lines(
        &self,
        filter: &PurchaseFilter,
    ) -> Result<Vec<PurchaseLine>, ErpError> {
        let (start, end) = filter.range.bounds();
        let mut sql = String::from(PURCHASE_LINES_SQL);
        let mut params = vec![Value::from(start), Value::from(end)];
        if let Some(status) = &filter.delivery_status {
            sql.push_str(" AND OI.SITUACAO_ENTREGA = ?");
            params.push(Value::from(status.as_str()));
        }
        if let Some(client) = filter.effective_client() {
            sql.push_str(" AND O.CODIGO_CLIENTE = ?");
            params.push(Value::Int(client));
        }
        sql.push_str(" ORDER BY OI.CODIGO_PRODUTO, OI.DATA_PREVISAO_ENTREGA ASC");
        self.fetch(&sql, params, purchase_line).await
    }

    async fn purchase_details(
        &self,
        filter: &PurchaseDetailFilter,
    ) -> Result<Vec<PurchaseDetail>, ErpError> {
        let (start, end) = filter.base.range.bounds();
        let mut sql = String::from(PURCHASE_DETAILS_SQL);
        let mut params = vec![Value::Int(filter.product), start.into(), end.into()];
        if let Some(client) = filter.base.effective_client() {
            sql.push_str(" AND O.CODIGO_CLIENTE = ?");
            params.push(Value::Int(client));
        }
        if let Some(status) = &filter.base.delivery_status {
            sql.push_str(" AND OI.SITUACAO_ENTREGA = ?");
            params.push(Value::from(status.as_str()));
        }
        self.fetch(&sql, params, purchase_detail).await
    }

    async fn search_clients(&self, term: &str) -> Result<Vec<ClientMatch>, ErpError> {
        let pattern = contains_pattern(term);
        self.fetch(SEARCH_CLIENTS_SQL, vec![pattern; 4], client_match)
            .await
    }

    async fn client_addresses(&self) -> Result<Vec<ClientAddress>, ErpError> {
        self.fetch(CLIENT_ADDRESSES_SQL, Vec::new(), client_address)
            .await
    }

    async fn client_agreement(&self, client: i64) -> Result<Option<ClientAgreement>, ErpError> {
        let agreements = self
            .fetch(CLIENT_AGREEMENT_SQL, vec![client.into()], |row| {
                Ok(ClientAgreement {
                    convenio_desconto: row.f64_or_zero("CONVENIO_DESCONTO")?,
                    apelido: row.opt_string("APELIDO")?,
                })
            })
            .await?;
        Ok(agreements.into_iter().next())
    }

    async fn receivables(&self, scope: ReceivableScope) -> Result<Vec<Receivable>, ErpError> {
        let mut sql = String::from(RECEIVABLES_SQL);
        let mut params = Vec::new();
        match scope {
            ReceivableScope::AllOutstanding => {
                sql.push_str(" WHERE CR.STATUS IN ('A', 'P') ORDER BY CR.DATA_VENCIMENTO DESC");
            }
            ReceivableScope::ClientOpen(client) => {
                sql.push_str(
                    " WHERE CR.STATUS = 'A' AND CR.CODIGO_CLIENTE = ? ORDER BY CR.DATA_VENCIMENTO ASC",
                );
                params.push(Value::Int(client));
            }
        }
        self.fetch(&sql, params, receivable).await
    }

    async fn sale_prices(&self, filter: &PriceFilter) -> Result<Vec<SalePrice>, ErpError> {
        let mut sql = String::from(SALE_PRICES_SQL);
        let mut params = Vec::new();
        if let Some(branch) = filter.branch {
            sql.push_str(" AND PP.CODIGO_FILIAL = ?");
            params.push(Value::Int(branch));
        }
        if let Some(code) = filter.code {
            sql.push_str(" AND P.CODIGO = ?");
            params.push(Value::Int(code));
        }
        if let Some(description) = filter.description.as_deref().filter(|d| !d.trim().is_empty()) {
            sql.push_str(" AND P.DESCRICAO LIKE ?");
            params.push(contains_pattern(&description.to_uppercase()));
        }
        if let Some(section) = filter.section {
            sql.push_str(" AND P.COD_SECAO = ?");
            params.push(Value::Int(section));
        }
        if let Some(group) = filter.group {
            sql.push_str(" AND P.COD_GRUPO = ?");
            params.push(Value::Int(group));
        }
        sql.push_str(" ORDER BY P.DESCRICAO");
        self.fetch(&sql, params, sale_price).await
    }

    async fn available_products(&self) -> Result<Vec<AvailableProduct>, ErpError> {
        self.fetch(
            AVAILABLE_PRODUCTS_SQL,
            vec![Branch::Matriz.code().into(), PRODUCE_SECTION.into()],
            available_product,
        )
        .await
    }

    async fn client_top_products(&self, client: i64) -> Result<Vec<TopProduct>, ErpError> {
        self.fetch(TOP_PRODUCTS_SQL, vec![client.into()], top_product)
            .await
    }

    async fn search_sales(&self, term: &str) -> Result<Vec<SaleSearchHit>, ErpError> {
        self.fetch(SEARCH_SALES_SQL, vec![contains_pattern(term)], sale_search_hit)
            .await
    }
}
